//! WAV file reading and writing.

use crate::{Error, Result};
use hound::{SampleFormat, WavReader, WavWriter};
use std::io::Read;
use std::path::Path;

/// WAV audio encoding format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavFormat {
    /// Linear PCM (integer samples).
    Pcm,
    /// IEEE 754 floating-point samples.
    IeeeFloat,
}

/// WAV file metadata extracted without loading sample data.
#[derive(Debug, Clone)]
pub struct WavInfo {
    /// Number of interleaved channels.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bit depth per sample.
    pub bits_per_sample: u16,
    /// Total number of sample frames (samples per channel).
    pub num_frames: u64,
    /// Duration in seconds.
    pub duration_secs: f64,
    /// Audio encoding format.
    pub format: WavFormat,
}

/// Read WAV metadata without loading sample data.
pub fn read_wav_info<P: AsRef<Path>>(path: P) -> Result<WavInfo> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let total_samples = u64::from(reader.len());
    let num_frames = total_samples / u64::from(spec.channels.max(1));
    let duration_secs = num_frames as f64 / f64::from(spec.sample_rate);

    let format = match spec.sample_format {
        SampleFormat::Float => WavFormat::IeeeFloat,
        SampleFormat::Int => WavFormat::Pcm,
    };

    Ok(WavInfo {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: spec.bits_per_sample,
        num_frames,
        duration_secs,
        format,
    })
}

/// WAV file specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    /// Number of interleaved channels.
    pub channels: u16,
    /// Sample rate in Hz (e.g., 44100, 48000).
    pub sample_rate: u32,
    /// Bit depth per sample (16, 24 or 32; 32 is written as float).
    pub bits_per_sample: u16,
}

impl Default for WavSpec {
    fn default() -> Self {
        Self {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
        }
    }
}

impl From<hound::WavSpec> for WavSpec {
    fn from(spec: hound::WavSpec) -> Self {
        Self {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
        }
    }
}

impl From<WavSpec> for hound::WavSpec {
    fn from(spec: WavSpec) -> Self {
        hound::WavSpec {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
            sample_format: if spec.bits_per_sample == 32 {
                SampleFormat::Float
            } else {
                SampleFormat::Int
            },
        }
    }
}

fn read_interleaved<R: Read>(reader: WavReader<R>) -> Result<Vec<f32>> {
    let spec = reader.spec();
    let samples = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };
    Ok(samples)
}

/// Read a WAV file and return samples as f32 along with its [`WavSpec`].
///
/// Multi-channel files are mixed down to mono by averaging channels. This is
/// the form recycling sources take.
///
/// # Example
/// ```ignore
/// let (samples, spec) = read_wav("kick.wav")?;
/// println!("Loaded {} samples at {} Hz", samples.len(), spec.sample_rate);
/// ```
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, WavSpec)> {
    let reader = WavReader::open(path)?;
    let spec = WavSpec::from(reader.spec());
    let channels = spec.channels as usize;
    let samples = read_interleaved(reader)?;

    // Mix down to mono if multi-channel
    let mono_samples = if channels > 1 {
        samples
            .chunks(channels)
            .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        samples
    };

    Ok((mono_samples, spec))
}

/// Read a WAV file into one buffer per channel.
pub fn read_wav_multi<P: AsRef<Path>>(path: P) -> Result<(Vec<Vec<f32>>, WavSpec)> {
    let reader = WavReader::open(path)?;
    let spec = WavSpec::from(reader.spec());
    let channels = (spec.channels as usize).max(1);
    let samples = read_interleaved(reader)?;

    let frames = samples.len() / channels;
    let mut lines = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks(channels) {
        for (line, &sample) in lines.iter_mut().zip(frame) {
            line.push(sample);
        }
    }
    Ok((lines, spec))
}

fn check_depth(bits_per_sample: u16) -> Result<()> {
    match bits_per_sample {
        16 | 24 | 32 => Ok(()),
        other => Err(Error::UnsupportedFormat(format!(
            "{other}-bit samples (use 16, 24 or 32)"
        ))),
    }
}

/// Write mono samples to a WAV file.
///
/// # Example
/// ```ignore
/// let samples = vec![0.0f32; 48000]; // 1 second of silence
/// let spec = WavSpec { sample_rate: 48000, ..Default::default() };
/// write_wav("output.wav", &samples, spec)?;
/// ```
pub fn write_wav<P: AsRef<Path>>(path: P, samples: &[f32], spec: WavSpec) -> Result<()> {
    write_wav_multi(path, &[samples.to_vec()], spec)
}

/// Write one buffer per channel, interleaved, to a WAV file.
///
/// The channel count of `spec` is replaced by `lines.len()`. All lines must
/// have the same length.
pub fn write_wav_multi<P: AsRef<Path>>(path: P, lines: &[Vec<f32>], spec: WavSpec) -> Result<()> {
    check_depth(spec.bits_per_sample)?;
    let expected = lines.first().map_or(0, Vec::len);
    if let Some((line, len)) = lines
        .iter()
        .map(Vec::len)
        .enumerate()
        .find(|&(_, len)| len != expected)
    {
        return Err(Error::RaggedLines {
            line,
            len,
            expected,
        });
    }

    let mut line_spec = spec;
    line_spec.channels = lines.len().max(1) as u16;
    let mut writer = WavWriter::create(path, hound::WavSpec::from(line_spec))?;

    if spec.bits_per_sample == 32 {
        for frame in 0..expected {
            for line in lines {
                writer.write_sample(line[frame])?;
            }
        }
    } else {
        let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
        for frame in 0..expected {
            for line in lines {
                let int_sample = (line[frame] * max_val).clamp(-max_val, max_val - 1.0) as i32;
                writer.write_sample(int_sample)?;
            }
        }
    }

    writer.finalize()?;
    tracing::debug!(
        "wav_write: {} lines x {} frames at {} Hz",
        lines.len(),
        expected,
        spec.sample_rate
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_roundtrip_f32() {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 / 1000.0).sin()).collect();
        let spec = WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
        };

        let file = NamedTempFile::new().unwrap();
        write_wav(file.path(), &samples, spec).unwrap();

        let (loaded, loaded_spec) = read_wav(file.path()).unwrap();
        assert_eq!(loaded_spec.sample_rate, 48000);
        assert_eq!(loaded.len(), samples.len());

        for (a, b) in samples.iter().zip(loaded.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_roundtrip_i16() {
        let samples: Vec<f32> = (0..1000).map(|i| (i as f32 / 1000.0).sin() * 0.9).collect();
        let spec = WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
        };

        let file = NamedTempFile::new().unwrap();
        write_wav(file.path(), &samples, spec).unwrap();

        let (loaded, loaded_spec) = read_wav(file.path()).unwrap();
        assert_eq!(loaded_spec.sample_rate, 44100);
        assert_eq!(loaded.len(), samples.len());

        // 16-bit has less precision
        for (a, b) in samples.iter().zip(loaded.iter()) {
            assert!((a - b).abs() < 0.001);
        }
    }

    #[test]
    fn test_lines_interleave() {
        let lines = vec![vec![0.25, 0.5], vec![-0.25, -0.5]];
        let file = NamedTempFile::new().unwrap();
        write_wav_multi(file.path(), &lines, WavSpec::default()).unwrap();

        let (loaded, spec) = read_wav_multi(file.path()).unwrap();
        assert_eq!(spec.channels, 2);
        assert_eq!(loaded, lines);

        // mono mixdown averages the lines
        let (mono, _) = read_wav(file.path()).unwrap();
        assert_eq!(mono, vec![0.0, 0.0]);
    }

    #[test]
    fn test_ragged_lines_rejected() {
        let file = NamedTempFile::new().unwrap();
        let err = write_wav_multi(file.path(), &[vec![0.0; 4], vec![0.0; 3]], WavSpec::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::RaggedLines {
                line: 1,
                len: 3,
                expected: 4
            }
        ));
    }

    #[test]
    fn test_unsupported_depth() {
        let file = NamedTempFile::new().unwrap();
        let spec = WavSpec {
            bits_per_sample: 12,
            ..WavSpec::default()
        };
        assert!(matches!(
            write_wav(file.path(), &[0.0], spec),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
