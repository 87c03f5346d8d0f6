//! Step pattern.

use std::sync::Arc;

use crate::error::RecallError;
use crate::flags::RecallFlags;
use crate::kinds::BeatCounter;
use crate::recall::{RecallHandler, StageContext};

/// A bar of on/off steps driving the voice's streams.
///
/// On every beat of its [`BeatCounter`] dependency whose step is set, the
/// pattern (re)starts the signal of each of its per-recycling children. The
/// pattern is persistent, so its stream children are too: they stay alive
/// between hits and only end when the voice is stopped.
#[derive(Debug, Clone)]
pub struct Pattern {
    steps: Arc<[bool]>,
    hits: u64,
}

impl Pattern {
    /// Kind name.
    pub const NAME: &'static str = "pattern";

    /// Parses a step string: `x`, `X` or `1` set a step, anything else
    /// leaves it empty. An empty string yields a single empty step.
    ///
    /// ```rust
    /// use voxtree_core::Pattern;
    ///
    /// let pattern = Pattern::parse("x..x");
    /// assert_eq!(pattern.steps(), &[true, false, false, true]);
    /// ```
    pub fn parse(steps: &str) -> Self {
        let mut parsed: Vec<bool> = steps
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| matches!(c, 'x' | 'X' | '1'))
            .collect();
        if parsed.is_empty() {
            parsed.push(false);
        }
        Self {
            steps: parsed.into(),
            hits: 0,
        }
    }

    /// The steps of the bar.
    pub fn steps(&self) -> &[bool] {
        &self.steps
    }

    /// How many steps this instance has played.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Step string in the form accepted by [`parse()`](Self::parse).
    pub fn to_step_string(&self) -> String {
        self.steps.iter().map(|&s| if s { 'x' } else { '.' }).collect()
    }
}

impl RecallHandler for Pattern {
    fn kind_name(&self) -> &'static str {
        Self::NAME
    }

    fn duplicate(&self) -> Box<dyn RecallHandler> {
        Box::new(self.clone())
    }

    fn default_flags(&self) -> RecallFlags {
        RecallFlags::PERSISTENT
    }

    fn run_inter(&mut self, cx: &mut StageContext<'_>) -> Result<(), RecallError> {
        let Some(beat) = cx
            .dependency_of_kind(BeatCounter::NAME)
            .and_then(|d| d.with_kind(|k| k.as_beat_counter().and_then(BeatCounter::beat)))
        else {
            return Ok(());
        };
        if !self.steps[beat as usize % self.steps.len()] {
            return Ok(());
        }
        let owner = cx.owner();
        for child in cx.children().iter() {
            if let Some(recycling) = child.recycling() {
                recycling.trigger(owner, false);
            }
        }
        self.hits += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_steps() {
        let pattern = Pattern::parse("x.X. 1..0");
        assert_eq!(
            pattern.steps(),
            &[true, false, true, false, true, false, false, false]
        );
        assert_eq!(pattern.to_step_string(), "x.x.x...");
        assert_eq!(Pattern::parse("").steps(), &[false]);
    }
}
