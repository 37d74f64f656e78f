use std::collections::VecDeque;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

pub const DEFAULT_TAIL_LINES: usize = 20;

/// How much advisory output a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    #[default]
    Quiet,
    /// Per-test pass/fail observations and parse errors.
    Test,
    /// Everything, each message prefixed with its trace line number.
    Line,
}

impl Verbosity {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "quiet" | "off" => Some(Self::Quiet),
            "test" => Some(Self::Test),
            "line" => Some(Self::Line),
            _ => None,
        }
    }
}

/// Destination for diagnostics that are written while the run is in
/// progress.
pub trait DiagnosticSink {
    fn emit(&mut self, message: &str) -> std::io::Result<()>;
}

/// Level-gated diagnostics owned by a session. Messages that pass the gate
/// go to the attached sink as they are produced and, unless disabled, are
/// also kept for the final outcome.
pub struct Diagnostics {
    verbosity: Verbosity,
    lines: Vec<String>,
    keep_lines: bool,
    tail: VecDeque<String>,
    tail_max: usize,
    sink: Option<Box<dyn DiagnosticSink>>,
    sink_error: Option<std::io::Error>,
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("verbosity", &self.verbosity)
            .field("lines", &self.lines.len())
            .field("keep_lines", &self.keep_lines)
            .field("streaming", &self.sink.is_some())
            .finish()
    }
}

impl Diagnostics {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            lines: Vec::new(),
            keep_lines: true,
            tail: VecDeque::new(),
            tail_max: DEFAULT_TAIL_LINES,
            sink: None,
            sink_error: None,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// When false, gated messages are only streamed and the tail is the
    /// sole in-memory record.
    pub fn keep_lines(mut self, keep: bool) -> Self {
        self.keep_lines = keep;
        self
    }

    /// Per-test message.
    pub fn test(&mut self, message: impl Into<String>) {
        self.record(Verbosity::Test, message.into());
    }

    /// Per-line message, prefixed with the trace line number.
    pub fn line(&mut self, line_number: usize, message: impl AsRef<str>) {
        self.record(
            Verbosity::Line,
            format!("LINE {line_number}: {}", message.as_ref()),
        );
    }

    fn record(&mut self, level: Verbosity, message: String) {
        if self.verbosity >= level {
            let failed = match self.sink.as_mut() {
                Some(sink) => sink.emit(&message).err(),
                None => None,
            };
            if let Some(err) = failed {
                self.sink = None;
                self.sink_error = Some(err);
            }
            if self.keep_lines {
                self.lines.push(message.clone());
            }
        }
        if self.tail.len() >= self.tail_max {
            self.tail.pop_front();
        }
        self.tail.push_back(message);
    }

    /// Messages emitted at the configured verbosity.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Last messages of any level, regardless of verbosity.
    pub fn tail(&self) -> Vec<String> {
        self.tail.iter().cloned().collect()
    }

    /// First sink failure. The sink is detached when it fails.
    pub fn take_sink_error(&mut self) -> Option<std::io::Error> {
        self.sink_error.take()
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

/// Appends diagnostics to a file, one timestamped line per message.
pub struct DiagnosticLogger {
    writer: BufWriter<File>,
}

impl DiagnosticLogger {
    pub fn new(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    pub fn write_line(&mut self, message: &str) -> std::io::Result<()> {
        let stamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        self.writer
            .write_all(format!("[{stamp}] {message}\n").as_bytes())
    }

    pub fn write_all_lines<I, S>(&mut self, messages: I) -> std::io::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for message in messages {
            self.write_line(message.as_ref())?;
        }
        self.writer.flush()
    }
}

impl DiagnosticSink for DiagnosticLogger {
    fn emit(&mut self, message: &str) -> std::io::Result<()> {
        self.write_line(message)?;
        self.writer.flush()
    }
}
