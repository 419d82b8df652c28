// src/exec/output.rs

//! Draining and classifying child output.
//!
//! Output is always consumed so pipe buffers never fill up and block the
//! child. In verbose mode lines are passed through untouched; otherwise each
//! line is classified and routed to a log level. The classification is
//! cosmetic only.

use std::sync::Arc;

use regex::{Regex, RegexSet};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{GoforgeError, Result};

/// Lines that carry no information during development.
const NOISE_PATTERNS: &[&str] = &[
    r"^\s*$",
    r"^go: (downloading|finding|extracting) ",
    r"^\[GIN-debug\]",
];

/// Lines the developer wants to see even when not verbose.
const IMPORTANT_PATTERN: &str =
    r"(?i)\b(listening|serving|started|starting|ready|server running|connected)\b";

/// Lines that look like something went wrong.
const PROBLEM_PATTERN: &str = r"(?i)(\berror\b|\bpanic(:|\b)|\bfatal\b|\bfailed\b|cannot |undefined: )";

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

/// How a line of child output is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    /// Dropped.
    Noise,
    /// Logged at `info`.
    Important,
    /// Logged at `warn`.
    Problem,
    /// Logged at `debug`.
    Ordinary,
}

#[derive(Debug, Clone)]
pub struct OutputClassifier {
    noise: RegexSet,
    important: Regex,
    problem: Regex,
}

impl OutputClassifier {
    /// Classifier with the built-in Go / Gin oriented pattern set.
    pub fn standard() -> Result<Self> {
        Self::new(NOISE_PATTERNS, IMPORTANT_PATTERN, PROBLEM_PATTERN)
    }

    pub fn new(noise: &[&str], important: &str, problem: &str) -> Result<Self> {
        let invalid = |e: regex::Error| GoforgeError::ConfigError(format!("invalid output pattern: {e}"));
        Ok(Self {
            noise: RegexSet::new(noise).map_err(invalid)?,
            important: Regex::new(important).map_err(invalid)?,
            problem: Regex::new(problem).map_err(invalid)?,
        })
    }

    /// Problems win over everything, important lines win over noise.
    pub fn classify(&self, line: &str) -> LineClass {
        if self.problem.is_match(line) {
            LineClass::Problem
        } else if self.important.is_match(line) {
            LineClass::Important
        } else if self.noise.is_match(line) {
            LineClass::Noise
        } else {
            LineClass::Ordinary
        }
    }
}

/// Spawn a task that reads `reader` line by line until EOF.
///
/// Lines are split on raw bytes and decoded lossily, so output that is not
/// UTF-8 never stops the drain. A stopped drain would close the pipe and
/// the child's next write would die on SIGPIPE.
pub fn spawn_output_drain<R>(
    reader: R,
    stream: StreamKind,
    pid: u32,
    verbose: bool,
    classifier: Arc<OutputClassifier>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(256);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) => {
                    debug!(pid, stream = stream.as_str(), error = %err, "output stream read failed");
                    break;
                }
            }
            let line = String::from_utf8_lossy(trim_line_ending(&buf));

            if verbose {
                match stream {
                    StreamKind::Stdout => println!("{line}"),
                    StreamKind::Stderr => eprintln!("{line}"),
                }
                continue;
            }

            match classifier.classify(&line) {
                LineClass::Noise => {}
                LineClass::Important => info!(pid, "{}", line),
                LineClass::Problem => warn!(pid, "{}", line),
                LineClass::Ordinary => debug!(pid, stream = stream.as_str(), "{}", line),
            }
        }

        debug!(pid, stream = stream.as_str(), "output stream closed");
    })
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_endings_are_trimmed() {
        assert_eq!(trim_line_ending(b"ready\n"), b"ready");
        assert_eq!(trim_line_ending(b"ready\r\n"), b"ready");
        assert_eq!(trim_line_ending(b"no newline"), b"no newline");
        assert_eq!(trim_line_ending(b"\n"), b"");
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_end_the_drain() {
        let classifier = Arc::new(OutputClassifier::standard().unwrap());
        let (mut writer, reader) = tokio::io::duplex(64);

        let drain = spawn_output_drain(reader, StreamKind::Stdout, 1, false, classifier);
        tokio::io::AsyncWriteExt::write_all(&mut writer, b"\xff\xfe bad bytes\n")
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!drain.is_finished(), "drain stopped on a non UTF-8 line");

        tokio::io::AsyncWriteExt::write_all(&mut writer, b"server listening\n")
            .await
            .unwrap();
        drop(writer);
        tokio::time::timeout(std::time::Duration::from_secs(2), drain)
            .await
            .unwrap()
            .unwrap();
    }
}
