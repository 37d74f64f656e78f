//! Line classification.
//!
//! A trace interleaves three sources: directives printed by the test harness,
//! the agent's debug logger (`xxxxxxxx [mm:ss.mmm] TAG    payload`) and raw
//! agent output. The debug header is a fixed-column format owned by the
//! agent's logger; any deviation routes the line to [`LineClass::AgentRaw`].

use std::ops::Range;

pub const MARKER_EXPECTED: &str = "!EXPECTED";
pub const MARKER_EXPECTED_CONTINUED: &str = "!EXPECTED+";
pub const MARKER_TEST_EXIT: &str = "!TESTEXIT";

pub const DEBUG_MIN_LEN: usize = 30;
pub const DEBUG_COUNTER: Range<usize> = 0..8;
pub const DEBUG_OPEN_BRACKET: usize = 9;
pub const DEBUG_MINUTES: Range<usize> = 10..12;
pub const DEBUG_COLON: usize = 12;
pub const DEBUG_SECONDS: Range<usize> = 13..15;
pub const DEBUG_DOT: usize = 15;
pub const DEBUG_MILLIS: Range<usize> = 16..19;
pub const DEBUG_CLOSE_BRACKET: usize = 19;
pub const DEBUG_TAG: Range<usize> = 21..27;
pub const DEBUG_PAYLOAD_START: usize = 29;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Single-shot declaration; closes the script.
    Expected,
    /// Declaration continued by the next directive line.
    ExpectedContinued,
    TestExit,
}

impl Directive {
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            MARKER_EXPECTED => Some(Self::Expected),
            MARKER_EXPECTED_CONTINUED => Some(Self::ExpectedContinued),
            MARKER_TEST_EXIT => Some(Self::TestExit),
            _ => None,
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Self::Expected => MARKER_EXPECTED,
            Self::ExpectedContinued => MARKER_EXPECTED_CONTINUED,
            Self::TestExit => MARKER_TEST_EXIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugTag<'a> {
    Agent,
    Call,
    Return,
    Other(&'a str),
}

impl<'a> DebugTag<'a> {
    fn from_field(field: &'a str) -> Self {
        match field.trim() {
            "AGENT" => Self::Agent,
            "CALL" => Self::Call,
            "RETURN" => Self::Return,
            other => Self::Other(other),
        }
    }

    pub fn as_str(&self) -> &'a str {
        match self {
            Self::Agent => "AGENT",
            Self::Call => "CALL",
            Self::Return => "RETURN",
            Self::Other(tag) => tag,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass<'a> {
    Directive {
        directive: Directive,
        payload: &'a str,
    },
    DebugFormatted {
        tag: DebugTag<'a>,
        payload: &'a str,
    },
    AgentRaw(&'a str),
}

pub fn classify(line: &str) -> LineClass<'_> {
    if let Some((directive, payload)) = parse_directive(line) {
        return LineClass::Directive { directive, payload };
    }
    if let Some((tag, payload)) = parse_debug_header(line) {
        return LineClass::DebugFormatted { tag, payload };
    }
    LineClass::AgentRaw(line)
}

fn parse_directive(line: &str) -> Option<(Directive, &str)> {
    let (marker, rest) = line
        .split_once(char::is_whitespace)
        .unwrap_or((line, ""));
    let directive = Directive::from_marker(marker)?;
    Some((directive, rest.trim()))
}

fn parse_debug_header(line: &str) -> Option<(DebugTag<'_>, &str)> {
    let bytes = line.as_bytes();
    if bytes.len() < DEBUG_MIN_LEN
        || bytes[DEBUG_OPEN_BRACKET] != b'['
        || bytes[DEBUG_COLON] != b':'
        || bytes[DEBUG_DOT] != b'.'
        || bytes[DEBUG_CLOSE_BRACKET] != b']'
    {
        return None;
    }
    for field in [DEBUG_COUNTER, DEBUG_MINUTES, DEBUG_SECONDS, DEBUG_MILLIS] {
        if !is_numeric(line.get(field)?) {
            return None;
        }
    }
    let tag = line.get(DEBUG_TAG)?;
    let payload = line.get(DEBUG_PAYLOAD_START..)?;
    Some((DebugTag::from_field(tag), payload))
}

fn is_numeric(field: &str) -> bool {
    field.parse::<u32>().is_ok()
}

/// Render a debug logger line in the agent's header format.
pub fn format_debug_line(counter: u32, millis_total: u32, tag: &str, payload: &str) -> String {
    let minutes = (millis_total / 60_000) % 100;
    let seconds = (millis_total / 1000) % 60;
    let millis = millis_total % 1000;
    format!("{counter:08} [{minutes:02}:{seconds:02}.{millis:03}] {tag:<6}  {payload}")
}
