use std::path::PathBuf;

/// A trace line that could not be turned into an event. Never fatal: the
/// session reports it and feeds an `ERROR` event in its place.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown agent callback {token:?}")]
    UnknownCallback { token: String },
    #[error("invalid agent boundary {field:?}")]
    UnknownBoundary { field: String },
    #[error("missing '{delimiter}' following {field}: {rest}")]
    MissingDelimiter {
        delimiter: char,
        field: &'static str,
        rest: String,
    },
    #[error("malformed class descriptor {descriptor:?}")]
    MalformedClass { descriptor: String },
    #[error("CALL needs callee and caller: {payload:?}")]
    MalformedCall { payload: String },
}

/// A harness declaration that contributes no script steps.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeclarationError {
    #[error("declaration is missing the {field} field")]
    MissingField { field: &'static str },
    #[error("invalid declaration type {code:?}")]
    InvalidType { code: String },
    #[error("{code} is not implemented")]
    Unsupported { code: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("unknown event kind {0:?} in ignore list")]
    UnknownEventKind(String),
    #[error("unknown verbosity {0:?} (want quiet, test or line)")]
    UnknownVerbosity(String),
    #[error("failed to resolve HOME")]
    Home,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("read trace line {line}: {source}")]
    Read {
        line: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("write diagnostics: {source}")]
    Sink {
        #[source]
        source: std::io::Error,
    },
}
