//! Recall kinds from their configured name and parameters.

use std::collections::BTreeMap;

use voxtree_core::{
    BeatCounter, DelayCounter, KIND_NAMES, Pattern, Play, RecallKind, Stream, Volume,
};

use crate::validation::{ValidationError, ValidationResult};

/// A kind plus the port values its parameters set.
#[derive(Debug)]
pub struct KindSpec {
    /// The configured kind.
    pub kind: RecallKind,
    /// `(port, value)` pairs applied to the template's ports.
    pub ports: Vec<(String, f32)>,
}

/// Parse a parameter value string into an f32.
///
/// Supports:
/// - Plain numbers: "0.5", "4", "-0.3"
/// - Percentages: "50%", "120%" (divided by 100)
/// - Decibels: "-6dB", "+3dB" (converted to linear gain)
pub fn parse_param_value(value: &str) -> Option<f32> {
    let value = value.trim();

    if let Some(pct) = value.strip_suffix('%') {
        return pct.trim().parse::<f32>().ok().map(|v| v / 100.0);
    }

    if let Some(db) = value
        .strip_suffix("dB")
        .or_else(|| value.strip_suffix("db"))
    {
        return db
            .trim()
            .parse::<f32>()
            .ok()
            .map(|v| 10.0_f32.powf(v / 20.0));
    }

    value.parse::<f32>().ok()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Builds the kind `kind` for template `template` from `params`.
///
/// Kind parameters (`steps` for patterns, `looping` for streams) configure the
/// kind itself; every other key must name one of the kind's ports and parse
/// as a number.
pub fn build_kind(
    template: &str,
    kind: &str,
    params: &BTreeMap<String, String>,
) -> ValidationResult<KindSpec> {
    let invalid = |param: &str, reason: String| ValidationError::InvalidParameter {
        template: template.to_owned(),
        param: param.to_owned(),
        reason,
    };

    let (built, consumed): (RecallKind, &[&str]) = match kind {
        DelayCounter::NAME => (RecallKind::DelayCounter(DelayCounter::new()), &[]),
        BeatCounter::NAME => (RecallKind::BeatCounter(BeatCounter::new()), &[]),
        Pattern::NAME => {
            let steps = params.get("steps").map_or("x", String::as_str);
            (RecallKind::Pattern(Pattern::parse(steps)), &["steps"])
        }
        Play::NAME => (RecallKind::Play(Play), &[]),
        Stream::NAME => {
            let looping = match params.get("looping") {
                Some(value) => parse_bool(value)
                    .ok_or_else(|| invalid("looping", format!("expected a boolean, got '{value}'")))?,
                None => false,
            };
            (RecallKind::Stream(Stream::new(looping)), &["looping"])
        }
        Volume::NAME => (RecallKind::Volume(Volume::new()), &[]),
        other => {
            return Err(ValidationError::UnknownKind {
                template: template.to_owned(),
                kind: other.to_owned(),
            });
        }
    };

    let specs = built.handler().port_specs();
    let mut ports = Vec::new();
    for (key, value) in params {
        if consumed.contains(&key.as_str()) {
            continue;
        }
        if !specs.iter().any(|s| s.name == key.as_str()) {
            return Err(ValidationError::UnknownParameter {
                template: template.to_owned(),
                kind: kind.to_owned(),
                param: key.clone(),
            });
        }
        let parsed =
            parse_param_value(value).ok_or_else(|| invalid(key, format!("not a number: '{value}'")))?;
        ports.push((key.clone(), parsed));
    }
    Ok(KindSpec { kind: built, ports })
}

/// Returns `true` if `kind` names a built-in kind.
pub fn is_known_kind(kind: &str) -> bool {
    KIND_NAMES.contains(&kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn parse_param_formats() {
        assert_eq!(parse_param_value("0.5"), Some(0.5));
        assert_eq!(parse_param_value(" 4 "), Some(4.0));
        assert_eq!(parse_param_value("50%"), Some(0.5));
        assert!((parse_param_value("-6dB").unwrap() - 0.501_187).abs() < 1e-4);
        assert_eq!(parse_param_value("0dB"), Some(1.0));
        assert_eq!(parse_param_value("loud"), None);
    }

    #[test]
    fn ports_from_params() {
        let spec = build_kind("clock", "delay-counter", &params(&[("delay", "8")])).unwrap();
        assert_eq!(spec.kind.name(), "delay-counter");
        assert_eq!(spec.ports, vec![("delay".to_owned(), 8.0)]);
    }

    #[test]
    fn kind_params_are_consumed() {
        let spec = build_kind("kick", "pattern", &params(&[("steps", "x...")])).unwrap();
        assert!(spec.ports.is_empty());
        let RecallKind::Pattern(pattern) = spec.kind else {
            panic!("expected a pattern");
        };
        assert_eq!(pattern.to_step_string(), "x...");

        let spec = build_kind("s", "stream", &params(&[("looping", "yes")])).unwrap();
        assert!(spec.kind.as_stream().unwrap().is_looping());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            build_kind("t", "theremin", &BTreeMap::new()),
            Err(ValidationError::UnknownKind { .. })
        ));
        assert!(matches!(
            build_kind("t", "volume", &params(&[("pan", "0.5")])),
            Err(ValidationError::UnknownParameter { .. })
        ));
        assert!(matches!(
            build_kind("t", "volume", &params(&[("volume", "loud")])),
            Err(ValidationError::InvalidParameter { .. })
        ));
        assert!(matches!(
            build_kind("t", "stream", &params(&[("looping", "maybe")])),
            Err(ValidationError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn known_kinds() {
        assert!(is_known_kind("beat-counter"));
        assert!(!is_known_kind("Beat-Counter"));
    }
}
