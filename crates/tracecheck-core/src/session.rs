//! Session controller: drives classification, parsing, script building and
//! matching over one trace, front to back.
//!
//! All run state lives in [`Session`]; nothing is global, so independent
//! sessions can run side by side in one process.

use std::fmt;
use std::io::BufRead;

use serde::Serialize;

use crate::classify::{classify, Directive, LineClass};
use crate::config::Config;
use crate::diagnostics::{DiagnosticSink, Diagnostics};
use crate::error::{ParseError, SessionError};
use crate::event::Event;
use crate::expected::{Declaration, ExpectedScript};
use crate::matcher::{Failure, FailureReason, Matcher, Step};
use crate::parse::{parse_agent_raw, parse_debug};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the caller should keep feeding lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub lines: usize,
    pub events_matched: usize,
    pub events_absorbed: usize,
    pub malformed_lines: usize,
    pub declarations: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub verdict: Verdict,
    /// Input ended without the end-of-test marker.
    pub incomplete: bool,
    pub failure: Option<Failure>,
    pub stats: Stats,
    pub diagnostics: Vec<String>,
    /// Recent diagnostics of every level, kept for failure reports.
    pub tail: Vec<String>,
}

impl Outcome {
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.incomplete {
            warnings.push(format!(
                "WARNING: {} message not found!",
                Directive::TestExit.marker()
            ));
        }
        warnings
    }

    pub fn report(&self) -> Report {
        Report {
            verdict: self.verdict,
            incomplete: self.incomplete,
            stats: self.stats,
            failure: self.failure.as_ref().map(FailureReport::from),
            tail: if self.failure.is_some() {
                self.tail.clone()
            } else {
                Vec::new()
            },
        }
    }
}

/// Machine-readable run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub verdict: Verdict,
    pub incomplete: bool,
    pub stats: Stats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tail: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    pub message: String,
    pub reason: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    pub received: String,
}

impl From<&Failure> for FailureReport {
    fn from(failure: &Failure) -> Self {
        let (reason, step, field, expected) = match &failure.reason {
            FailureReason::NoScript => ("no_script", None, None, None),
            FailureReason::Exhausted => ("exhausted", None, None, None),
            FailureReason::Mismatch {
                index,
                field,
                expected,
            } => (
                "mismatch",
                Some(*index),
                Some(field.field_name()),
                Some(expected.to_string()),
            ),
        };
        Self {
            message: failure.to_string(),
            reason,
            test: failure.test.clone(),
            step,
            field,
            expected,
            received: failure.received.to_string(),
        }
    }
}

#[derive(Debug)]
enum Declared {
    /// No script yet; trace output is not checked.
    Idle,
    /// `!EXPECTED+` lines are accumulating.
    Collecting(ExpectedScript),
    /// Script closed and loaded into the matcher.
    Armed,
}

#[derive(Debug)]
pub struct Session {
    matcher: Matcher,
    declared: Declared,
    ignore: Vec<Event>,
    diagnostics: Diagnostics,
    line_number: usize,
    saw_test_exit: bool,
    stopped: bool,
    stats: Stats,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        Self::with_diagnostics(config, Diagnostics::new(config.logging.verbosity))
    }

    /// Session whose diagnostics go to `sink` as they are produced. With
    /// `keep_lines` false the outcome carries only the diagnostic tail.
    pub fn streaming(
        config: &Config,
        sink: Option<Box<dyn DiagnosticSink>>,
        keep_lines: bool,
    ) -> Self {
        let mut diagnostics = Diagnostics::new(config.logging.verbosity).keep_lines(keep_lines);
        if let Some(sink) = sink {
            diagnostics = diagnostics.with_sink(sink);
        }
        Self::with_diagnostics(config, diagnostics)
    }

    fn with_diagnostics(config: &Config, diagnostics: Diagnostics) -> Self {
        Self {
            matcher: Matcher::new(config.matcher.stdout_method.clone()),
            declared: Declared::Idle,
            ignore: config.matcher.ignore.clone(),
            diagnostics,
            line_number: 0,
            saw_test_exit: false,
            stopped: false,
            stats: Stats::default(),
        }
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn feed_line(&mut self, line: &str) -> Flow {
        if self.stopped {
            return Flow::Stop;
        }
        self.line_number += 1;
        self.stats.lines += 1;

        match classify(line) {
            LineClass::Directive { directive, payload } => self.on_directive(directive, payload),
            // Until a script is armed the trace is harness start-up noise.
            _ if !matches!(self.declared, Declared::Armed) => {}
            LineClass::DebugFormatted { tag, payload } => {
                let parsed = parse_debug(tag, payload);
                self.on_parsed(parsed);
            }
            LineClass::AgentRaw(raw) => {
                let parsed = parse_agent_raw(raw);
                if let Ok(Some(event)) = &parsed {
                    let line_number = self.line_number;
                    self.diagnostics
                        .line(line_number, format!("agent output: {event}"));
                }
                self.on_parsed(parsed);
            }
        }

        if self.matcher.is_failed() {
            self.stopped = true;
        }
        if self.stopped {
            Flow::Stop
        } else {
            Flow::Continue
        }
    }

    /// Feed every line of `reader` until the session stops.
    pub fn feed_reader<R: BufRead>(&mut self, mut reader: R) -> Result<(), SessionError> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|source| SessionError::Read {
                    line: self.line_number + 1,
                    source,
                })?;
            if read == 0 {
                return Ok(());
            }
            let text = String::from_utf8_lossy(&buf);
            let line = text.trim_end_matches(['\n', '\r']);
            if self.feed_line(line) == Flow::Stop {
                return Ok(());
            }
        }
    }

    pub fn finish(self) -> Outcome {
        self.conclude().0
    }

    fn conclude(self) -> (Outcome, Option<std::io::Error>) {
        let failure = self.matcher.failure().cloned();
        let incomplete = !self.saw_test_exit && failure.is_none();
        let mut diagnostics = self.diagnostics;
        if incomplete {
            diagnostics.test(format!(
                "incomplete: {} not seen",
                Directive::TestExit.marker()
            ));
        }
        let sink_error = diagnostics.take_sink_error();
        let outcome = Outcome {
            verdict: if failure.is_some() {
                Verdict::Fail
            } else {
                Verdict::Pass
            },
            incomplete,
            failure,
            stats: self.stats,
            tail: diagnostics.tail(),
            diagnostics: diagnostics.into_lines(),
        };
        (outcome, sink_error)
    }

    fn on_directive(&mut self, directive: Directive, payload: &str) {
        let line_number = self.line_number;
        match directive {
            Directive::TestExit => {
                self.diagnostics.line(line_number, "end of test case");
                if let Declared::Collecting(script) = &self.declared {
                    let pending = script.declarations().len();
                    self.diagnostics.test(format!(
                        "ERROR line {line_number}: {pending} {} declaration(s) never closed by {}",
                        Directive::ExpectedContinued.marker(),
                        Directive::Expected.marker()
                    ));
                }
                self.feed_event(&Event::exit());
                self.saw_test_exit = true;
                self.stopped = true;
            }
            Directive::Expected | Directive::ExpectedContinued => {
                if matches!(self.declared, Declared::Armed) {
                    // Closing the previous test implicitly.
                    self.feed_event(&Event::exit());
                    if self.matcher.is_failed() {
                        return;
                    }
                    self.matcher.reset();
                    self.declared = Declared::Idle;
                }
                let mut script = match std::mem::replace(&mut self.declared, Declared::Idle) {
                    Declared::Collecting(script) => script,
                    _ => ExpectedScript::new(),
                };
                self.declare(&mut script, payload);
                if directive == Directive::Expected {
                    self.arm(script);
                } else {
                    self.declared = Declared::Collecting(script);
                }
            }
        }
    }

    fn declare(&mut self, script: &mut ExpectedScript, payload: &str) {
        let line_number = self.line_number;
        let declaration = match Declaration::parse(payload) {
            Ok(declaration) => declaration,
            Err(err) => {
                self.diagnostics
                    .test(format!("ERROR line {line_number}: {err}"));
                return;
            }
        };
        let label = declaration.to_string();
        match script.push(declaration) {
            Ok(()) => {
                self.stats.declarations += 1;
                self.diagnostics
                    .line(line_number, format!("NEW TEST - EXPECTING: {label}"));
            }
            Err(err) => self.diagnostics.test(format!("ERROR: {err}")),
        }
    }

    fn arm(&mut self, mut script: ExpectedScript) {
        let line_number = self.line_number;
        script.close();
        if !self.ignore.is_empty() {
            self.diagnostics.line(line_number, "ignore list:");
            for pattern in &self.ignore {
                self.diagnostics.line(line_number, format!("- {pattern}"));
            }
        }
        self.diagnostics.line(line_number, "expected list:");
        for step in script.steps() {
            self.diagnostics.line(line_number, format!("- {step}"));
        }
        self.matcher.load(script, self.ignore.clone());
        self.declared = Declared::Armed;
    }

    fn on_parsed(&mut self, parsed: Result<Option<Event>, ParseError>) {
        match parsed {
            Ok(Some(event)) => self.feed_event(&event),
            Ok(None) => {}
            Err(err) => {
                let line_number = self.line_number;
                self.stats.malformed_lines += 1;
                self.diagnostics
                    .test(format!("ERROR line {line_number}: {err}"));
                self.feed_event(&Event::error());
            }
        }
    }

    fn feed_event(&mut self, event: &Event) {
        let line_number = self.line_number;
        match self.matcher.advance(event) {
            Step::Inert => {}
            Step::Matched { index } => {
                self.stats.events_matched += 1;
                let test = self
                    .matcher
                    .script()
                    .declaration_for(index)
                    .map_or_else(|| "-".to_string(), |declaration| declaration.to_string());
                self.diagnostics.test(format!("PASS - {test} :: {event}"));
            }
            Step::Absorbed => {
                self.stats.events_absorbed += 1;
                self.diagnostics
                    .line(line_number, format!("ignoring {}", event.kind));
            }
            Step::Failed(failure) => {
                self.diagnostics.test(failure.to_string());
            }
        }
    }
}

/// Run a whole trace held in memory.
pub fn run_lines<I, S>(config: &Config, lines: I) -> Outcome
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut session = Session::new(config);
    for line in lines {
        if session.feed_line(line.as_ref()) == Flow::Stop {
            break;
        }
    }
    session.finish()
}

/// Run a whole trace from a reader.
pub fn run_reader<R: BufRead>(config: &Config, reader: R) -> Result<Outcome, SessionError> {
    let mut session = Session::new(config);
    session.feed_reader(reader)?;
    Ok(session.finish())
}

/// Run a trace from `reader`, writing diagnostics to `sink` while it runs.
pub fn run_streamed<R: BufRead>(
    config: &Config,
    reader: R,
    sink: Option<Box<dyn DiagnosticSink>>,
    keep_lines: bool,
) -> Result<Outcome, SessionError> {
    let mut session = Session::streaming(config, sink, keep_lines);
    session.feed_reader(reader)?;
    match session.conclude() {
        (_, Some(source)) => Err(SessionError::Sink { source }),
        (outcome, None) => Ok(outcome),
    }
}

#[cfg(test)]
mod tests {
    use super::{run_lines, run_reader, run_streamed, Flow, Session, Verdict};
    use crate::config::Config;
    use crate::diagnostics::{DiagnosticSink, Verbosity};
    use crate::error::SessionError;
    use crate::event::{Callback, Event};
    use crate::matcher::FailureReason;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct SharedSink(Rc<RefCell<Vec<String>>>);

    impl DiagnosticSink for SharedSink {
        fn emit(&mut self, message: &str) -> std::io::Result<()> {
            self.0.borrow_mut().push(message.to_string());
            Ok(())
        }
    }

    struct FullDisk;

    impl DiagnosticSink for FullDisk {
        fn emit(&mut self, _message: &str) -> std::io::Result<()> {
            Err(std::io::Error::other("no space left"))
        }
    }

    fn verbose() -> Config {
        let mut config = Config::default();
        config.logging.verbosity = Verbosity::Line;
        config
    }

    #[test]
    fn lines_before_first_declaration_are_ignored() {
        let outcome = run_lines(
            &Config::default(),
            ["00000001 [00:00.001] RETURN  A.run()V", "noise", "!TESTEXIT"],
        );
        // TESTEXIT with no script at all is a missing-setup failure.
        assert_eq!(outcome.verdict, Verdict::Fail);
        assert_eq!(outcome.stats.events_matched, 0);
    }

    #[test]
    fn missing_test_exit_is_incomplete_but_passes() {
        let outcome = run_lines(&Config::default(), ["!EXPECTED II A.main A.run"]);
        assert_eq!(outcome.verdict, Verdict::Pass);
        assert!(outcome.incomplete);
        assert_eq!(outcome.warnings(), vec!["WARNING: !TESTEXIT message not found!"]);
    }

    #[test]
    fn unknown_callback_is_reported_and_skipped() {
        let mut session = Session::new(&verbose());
        assert_eq!(session.feed_line("!EXPECTED II A.main A.run"), Flow::Continue);
        assert_eq!(
            session.feed_line("00000001 [00:00.001] AGENT   frobnicate: x = 1"),
            Flow::Continue
        );
        assert_eq!(session.matcher().cursor(), 0);
        let outcome = session.finish();
        assert_eq!(outcome.stats.malformed_lines, 1);
        assert!(outcome
            .diagnostics
            .iter()
            .any(|line| line == "ERROR line 2: unknown agent callback \"frobnicate:\""));
    }

    #[test]
    fn mismatch_stops_consuming_input() {
        let mut session = Session::new(&Config::default());
        let _ = session.feed_line("!EXPECTED II A.main A.run");
        assert_eq!(session.feed_line("00000001 [00:00.001] RETURN  A.run()V"), Flow::Stop);
        assert!(session.is_stopped());
        assert_eq!(session.feed_line("!TESTEXIT"), Flow::Stop);
        let outcome = session.finish();
        assert_eq!(outcome.verdict, Verdict::Fail);
        assert!(!outcome.incomplete);
        assert_eq!(outcome.stats.lines, 2);
    }

    #[test]
    fn configured_ignore_patterns_are_loaded_per_script() {
        let mut config = Config::default();
        config.matcher.ignore = vec![Event::callback(Callback::BeginFrame)];
        let mut session = Session::new(&config);
        let _ = session.feed_line("!EXPECTED II A.main A.run");
        assert_eq!(session.matcher().ignore_set(), config.matcher.ignore.as_slice());
        assert_eq!(
            session.feed_line("00000001 [00:00.001] AGENT   beginFrame: maxLocals = 2"),
            Flow::Continue
        );
        assert_eq!(session.finish().stats.events_absorbed, 1);
    }

    #[test]
    fn reader_handles_crlf_and_invalid_utf8() {
        let mut bytes = b"!EXPECTED II A.main A.run\r\n".to_vec();
        bytes.extend_from_slice(b"\xff\xfe program output\r\n");
        let outcome = match run_reader(&Config::default(), bytes.as_slice()) {
            Ok(outcome) => outcome,
            Err(err) => panic!("run: {err}"),
        };
        assert_eq!(outcome.stats.lines, 2);
        assert_eq!(outcome.stats.declarations, 1);
        assert_eq!(outcome.verdict, Verdict::Pass);
    }

    #[test]
    fn tab_separated_declaration_is_a_directive() {
        let outcome = run_lines(
            &Config::default(),
            ["!EXPECTED\tII A.main A.run", "!TESTEXIT"],
        );
        assert_eq!(outcome.stats.declarations, 1);
        // The script was loaded, so EXIT diverges at its first step.
        match outcome.failure.map(|failure| failure.reason) {
            Some(FailureReason::Mismatch { index, .. }) => assert_eq!(index, 0),
            other => panic!("unexpected failure {other:?}"),
        }
    }

    #[test]
    fn unclosed_continuation_is_named_at_test_exit() {
        let mut config = Config::default();
        config.logging.verbosity = Verbosity::Test;
        let outcome = run_lines(
            &config,
            [
                "!EXPECTED+ II A.main A.run",
                "!EXPECTED+ II A.main A.walk",
                "!TESTEXIT",
            ],
        );
        assert_eq!(outcome.verdict, Verdict::Fail);
        let expected = "ERROR line 3: 2 !EXPECTED+ declaration(s) never closed by !EXPECTED";
        assert!(
            outcome.diagnostics.iter().any(|line| line == expected),
            "{:?}",
            outcome.diagnostics
        );
    }

    #[test]
    fn streamed_run_writes_diagnostics_without_keeping_them() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let trace = "!EXPECTED II A.main A.run\n00000001 [00:00.001] AGENT   frobnicate: x\n";
        let outcome = match run_streamed(
            &verbose(),
            trace.as_bytes(),
            Some(Box::new(SharedSink(Rc::clone(&seen)))),
            false,
        ) {
            Ok(outcome) => outcome,
            Err(err) => panic!("run: {err}"),
        };
        assert!(outcome.diagnostics.is_empty());
        assert!(!outcome.tail.is_empty());
        let seen = seen.borrow();
        assert_eq!(
            seen.first().map(String::as_str),
            Some("LINE 1: NEW TEST - EXPECTING: II A.main A.run")
        );
        assert!(seen
            .iter()
            .any(|line| line == "ERROR line 2: unknown agent callback \"frobnicate:\""));
        assert_eq!(
            seen.last().map(String::as_str),
            Some("incomplete: !TESTEXIT not seen")
        );
    }

    #[test]
    fn streamed_run_reports_sink_failure() {
        let result = run_streamed(
            &verbose(),
            "!EXPECTED II A.main A.run\n!TESTEXIT\n".as_bytes(),
            Some(Box::new(FullDisk)),
            true,
        );
        assert!(matches!(result, Err(SessionError::Sink { .. })));
    }
}
