//! Sequence matcher: walks a cursor through an [`ExpectedScript`].
//!
//! The cursor only moves forward, one step per exact match. Events that do
//! not match are either absorbed (ignore set and the two positional
//! carve-outs for the harness's own print calls) or set the sticky failure,
//! after which every further event is inert. [`Matcher::reset`] clears the
//! script, cursor and ignore set but never the failure.

use std::fmt;

use crate::event::{Boundary, Callback, Event, EventKind, Mismatch};
use crate::expected::ExpectedScript;

pub const DEFAULT_STDOUT_METHOD: &str = "java.io.PrintStream.println";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// An event arrived before any script was loaded.
    NoScript,
    /// An event arrived after every step, including `EXIT`, was consumed.
    Exhausted,
    Mismatch {
        index: usize,
        field: Mismatch,
        expected: Event,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub reason: FailureReason,
    pub received: Event,
    /// Declaration that owned the failing step, when there is one.
    pub test: Option<String>,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let test = self.test.as_deref().unwrap_or("-");
        write!(f, "FAIL - {test} :: {} :: ", self.received.kind)?;
        match &self.reason {
            FailureReason::NoScript => write!(f, "no expected sequence configured"),
            FailureReason::Exhausted => write!(f, "expected sequence already complete"),
            FailureReason::Mismatch {
                field, expected, ..
            } => match field {
                Mismatch::Kind => write!(f, "expected: {}", expected.kind),
                Mismatch::Arg1 => write!(
                    f,
                    "expected: arg1 = {} (was: {})",
                    expected.arg1, self.received.arg1
                ),
                Mismatch::Arg2 => write!(
                    f,
                    "expected: arg2 = {} (was: {})",
                    expected.arg2, self.received.arg2
                ),
            },
        }
    }
}

/// Outcome of feeding one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Nothing happened: inert kind, or the run has already failed.
    Inert,
    Matched { index: usize },
    Absorbed,
    Failed(Failure),
}

#[derive(Debug, Clone)]
pub struct Matcher {
    script: ExpectedScript,
    ignore: Vec<Event>,
    cursor: usize,
    failure: Option<Failure>,
    stdout_method: String,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(DEFAULT_STDOUT_METHOD)
    }
}

impl Matcher {
    pub fn new(stdout_method: impl Into<String>) -> Self {
        Self {
            script: ExpectedScript::new(),
            ignore: Vec::new(),
            cursor: 0,
            failure: None,
            stdout_method: stdout_method.into(),
        }
    }

    /// Install the script and ignore set for the next test.
    pub fn load(&mut self, script: ExpectedScript, ignore: Vec<Event>) {
        self.script = script;
        self.ignore = ignore;
        self.cursor = 0;
    }

    pub fn reset(&mut self) {
        self.script = ExpectedScript::new();
        self.ignore.clear();
        self.cursor = 0;
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn script(&self) -> &ExpectedScript {
        &self.script
    }

    pub fn ignore_set(&self) -> &[Event] {
        &self.ignore
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    /// True once every step, including `EXIT`, has matched.
    pub fn is_complete(&self) -> bool {
        !self.script.is_empty() && self.cursor == self.script.len()
    }

    /// Step the cursor is waiting on.
    pub fn expected(&self) -> Option<&Event> {
        self.script.get(self.cursor)
    }

    pub fn advance(&mut self, event: &Event) -> Step {
        if self.failure.is_some() || event.kind.is_inert() {
            return Step::Inert;
        }
        if self.script.is_empty() {
            return self.fail(FailureReason::NoScript, event, None);
        }

        let ignorable = self.is_ignorable(event);
        let Some(expected) = self.script.get(self.cursor) else {
            if ignorable {
                return Step::Absorbed;
            }
            return self.fail(FailureReason::Exhausted, event, None);
        };

        match event.compare(expected) {
            None => {
                let index = self.cursor;
                self.cursor += 1;
                Step::Matched { index }
            }
            Some(_) if ignorable => Step::Absorbed,
            Some(field) => {
                let reason = FailureReason::Mismatch {
                    index: self.cursor,
                    field,
                    expected: expected.clone(),
                };
                let test = self
                    .script
                    .declaration_for(self.cursor)
                    .map(|declaration| declaration.to_string());
                self.fail(reason, event, test)
            }
        }
    }

    fn is_ignorable(&self, event: &Event) -> bool {
        if self.ignore.iter().any(|pattern| event.matches(pattern)) {
            return true;
        }

        let is_stdout = event.arg1 == self.stdout_method;
        // The harness's own print of its declarations returns into the test
        // just before the first expected step.
        if self.cursor == 0 && event.kind == EventKind::Leave(Boundary::CalleeOnly) && is_stdout {
            return true;
        }
        // Trailing noise from the harness's exit print.
        let at_exit = self
            .script
            .get(self.cursor)
            .is_some_and(|step| step.kind == EventKind::Exit);
        at_exit
            && (event.kind == EventKind::Callback(Callback::RemoveParams)
                || (event.kind == EventKind::Entry(Boundary::CallerOnly) && is_stdout))
    }

    fn fail(&mut self, reason: FailureReason, event: &Event, test: Option<String>) -> Step {
        let failure = Failure {
            reason,
            received: event.clone(),
            test,
        };
        self.failure = Some(failure.clone());
        Step::Failed(failure)
    }
}
