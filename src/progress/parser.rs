//! Line parser for ffmpeg's `-progress` output.
//!
//! ffmpeg emits blocks of `key=value` lines, each block closed by
//! `progress=continue` or, for the final block, `progress=end`. Only the frame
//! counter and the block terminator matter here.

use thiserror::Error;

/// What a single progress line means for the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressUpdate {
    /// Frames encoded so far.
    Frame(u64),
    /// The encoder reported its final block.
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressLineError {
    #[error("progress line is not key=value: {0:?}")]
    NotKeyValue(String),

    #[error("invalid frame counter: {0:?}")]
    InvalidFrame(String),
}

/// Consumes progress lines, independent of how they arrive.
pub trait ProgressSink {
    fn consume(&mut self, line: &str) -> Result<Option<ProgressUpdate>, ProgressLineError>;
}

/// [`ProgressSink`] for ffmpeg's `key=value` protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyValueProgress;

impl KeyValueProgress {
    pub fn new() -> Self {
        Self
    }
}

impl ProgressSink for KeyValueProgress {
    fn consume(&mut self, line: &str) -> Result<Option<ProgressUpdate>, ProgressLineError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| ProgressLineError::NotKeyValue(line.to_string()))?;

        match (key.trim(), value.trim()) {
            ("frame", value) => {
                let frame: u64 = value
                    .parse()
                    .map_err(|_| ProgressLineError::InvalidFrame(value.to_string()))?;
                Ok(Some(ProgressUpdate::Frame(frame)))
            }
            ("progress", "end") => Ok(Some(ProgressUpdate::Finished)),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_ffmpeg_block() {
        let block = "frame=120\nfps=59.94\nbitrate=N/A\nout_time=00:00:02.000000\nprogress=continue\n";
        let mut sink = KeyValueProgress::new();

        let updates: Vec<_> = block
            .lines()
            .filter_map(|line| sink.consume(line).unwrap())
            .collect();

        assert_eq!(updates, vec![ProgressUpdate::Frame(120)]);
    }

    #[test]
    fn test_end_marker() {
        let mut sink = KeyValueProgress::new();
        assert_eq!(sink.consume("progress=end").unwrap(), Some(ProgressUpdate::Finished));
        assert_eq!(sink.consume("progress=continue").unwrap(), None);
    }

    #[test]
    fn test_malformed_lines() {
        let mut sink = KeyValueProgress::new();
        assert_eq!(
            sink.consume("garbage"),
            Err(ProgressLineError::NotKeyValue("garbage".to_string()))
        );
        assert_eq!(
            sink.consume("frame=abc"),
            Err(ProgressLineError::InvalidFrame("abc".to_string()))
        );
        assert_eq!(sink.consume("   ").unwrap(), None);
    }
}
