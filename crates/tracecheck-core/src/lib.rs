//! tracecheck-core: checks an instrumentation agent's trace against the
//! event sequences the test harness declares inside the same trace.
//!
//! Lines are classified ([`classify`]), turned into [`event::Event`]s
//! ([`parse`]), and fed to a [`matcher::Matcher`] holding the script built
//! from the harness's declarations ([`expected`]). [`session::Session`] ties
//! the pieces together and produces the PASS/FAIL [`session::Outcome`].

pub mod classify;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod expected;
pub mod matcher;
pub mod parse;
pub mod session;

pub use config::{load_config, Config};
pub use error::{ConfigError, DeclarationError, ParseError, SessionError};
pub use event::{Boundary, Callback, Event, EventKind};
pub use diagnostics::DiagnosticSink;
pub use session::{run_lines, run_reader, run_streamed, Outcome, Report, Session, Verdict};

/// Crate identity label.
pub fn crate_label() -> &'static str {
    "tracecheck-core"
}
