//! Event parsing for agent callbacks, fixed-column agent trace lines and the
//! debug logger's `CALL`/`RETURN` payloads.
//!
//! The trace-line layout is owned by the agent:
//!
//! ```text
//! 0                               32  34    40  44
//! Instrumented   to instrumented    entry       1, Lpkg/Cls;method(I)V
//! ```
//!
//! Columns 0..32 name the boundary, 34..40 hold `entry`/`return`, and from
//! column 44 comes `<thread>, L<class>;<method><signature>`.

use std::fmt;
use std::ops::Range;

use crate::classify::DebugTag;
use crate::error::ParseError;
use crate::event::{Boundary, Callback, Event, EventKind};

pub const TRACE_MIN_LEN: usize = 61;
pub const TRACE_BOUNDARY: Range<usize> = 0..32;
pub const TRACE_DIRECTION: Range<usize> = 34..40;
pub const TRACE_DETAIL_START: usize = 44;

const BOUNDARY_BOTH: &str = "Instrumented   to instrumented  ";
const BOUNDARY_CALLER_ONLY: &str = "Instrumented   to uninstrumented";
const BOUNDARY_CALLEE_ONLY: &str = "Uninstrumented to instrumented  ";
const DIRECTION_RETURN: &str = "return";

fn boundary_field(boundary: Boundary) -> &'static str {
    match boundary {
        Boundary::Both => BOUNDARY_BOTH,
        Boundary::CallerOnly => BOUNDARY_CALLER_ONLY,
        Boundary::CalleeOnly => BOUNDARY_CALLEE_ONLY,
    }
}

/// One decoded agent trace line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    pub boundary: Boundary,
    pub leave: bool,
    pub thread_id: String,
    /// Dotted class name (`java.io.PrintStream`).
    pub class_name: String,
    pub method_name: String,
    pub signature: String,
}

impl TraceRecord {
    pub fn qualified_method(&self) -> String {
        format!("{}.{}", self.class_name, self.method_name)
    }

    pub fn kind(&self) -> EventKind {
        if self.leave {
            EventKind::Leave(self.boundary)
        } else {
            EventKind::Entry(self.boundary)
        }
    }

    pub fn to_event(&self) -> Event {
        Event::with_arg(self.kind(), self.qualified_method())
    }
}

impl fmt::Display for TraceRecord {
    /// Renders the agent's wire format.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = if self.leave { DIRECTION_RETURN } else { "entry" };
        write!(
            f,
            "{}  {:<6}    {}, L{};{}{}",
            boundary_field(self.boundary),
            direction,
            self.thread_id,
            self.class_name.replace('.', "/"),
            self.method_name,
            self.signature
        )
    }
}

/// Parse a fixed-column agent trace line. Lines shorter than
/// [`TRACE_MIN_LEN`] produce no record.
pub fn parse_trace_line(line: &str) -> Result<Option<TraceRecord>, ParseError> {
    if line.len() < TRACE_MIN_LEN {
        return Ok(None);
    }

    let field = line.get(TRACE_BOUNDARY).unwrap_or_default();
    let boundary = Boundary::ALL
        .into_iter()
        .find(|boundary| boundary_field(*boundary) == field)
        .ok_or_else(|| ParseError::UnknownBoundary {
            field: field.to_string(),
        })?;
    let leave = line
        .get(TRACE_DIRECTION)
        .is_some_and(|direction| direction.starts_with(DIRECTION_RETURN));

    let detail = line.get(TRACE_DETAIL_START..).unwrap_or_default();
    let (thread_id, descriptor) = split_at_delimiter(detail, ',', "thread id")?;
    let (class_part, method_part) = split_at_delimiter(descriptor, ';', "class")?;
    // Descriptor reads " Lpkg/Cls": drop the separator space and the 'L' tag.
    let class_name = class_part
        .get(2..)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ParseError::MalformedClass {
            descriptor: class_part.to_string(),
        })?
        .replace('/', ".");
    let open = delimiter_offset(method_part, '(', "method")?;
    let (method_name, signature) = method_part.split_at(open);

    Ok(Some(TraceRecord {
        boundary,
        leave,
        thread_id: thread_id.to_string(),
        class_name,
        method_name: method_name.to_string(),
        signature: signature.to_string(),
    }))
}

fn delimiter_offset(text: &str, delimiter: char, field: &'static str) -> Result<usize, ParseError> {
    match text.find(delimiter) {
        Some(offset) if offset > 0 => Ok(offset),
        _ => Err(ParseError::MissingDelimiter {
            delimiter,
            field,
            rest: text.to_string(),
        }),
    }
}

fn split_at_delimiter<'a>(
    text: &'a str,
    delimiter: char,
    field: &'static str,
) -> Result<(&'a str, &'a str), ParseError> {
    let offset = delimiter_offset(text, delimiter, field)?;
    Ok((&text[..offset], &text[offset + delimiter.len_utf8()..]))
}

/// Parse an agent callback payload such as `createFrame: numParams = 1`.
pub fn parse_callback(payload: &str) -> Result<Event, ParseError> {
    let token = payload.split(' ').next().unwrap_or_default();
    let name = token.split_once(':').map_or(token, |(name, _)| name);
    Callback::from_token(name)
        .map(Event::callback)
        .ok_or_else(|| ParseError::UnknownCallback {
            token: token.to_string(),
        })
}

/// Parse a `CALL` payload: `<n> <callee>[sig] <caller>[sig] ...`.
pub fn parse_call(payload: &str) -> Result<Event, ParseError> {
    let mut tokens = payload.split(' ');
    let _ordinal = tokens.next();
    match (tokens.next(), tokens.next()) {
        (Some(callee), Some(caller)) if !callee.is_empty() && !caller.is_empty() => Ok(
            Event::with_args(EventKind::Call, strip_signature(callee), strip_signature(caller)),
        ),
        _ => Err(ParseError::MalformedCall {
            payload: payload.to_string(),
        }),
    }
}

fn strip_signature(method: &str) -> &str {
    method.split_once('(').map_or(method, |(name, _)| name)
}

/// Event for a debug logger line. Tags other than `AGENT`, `CALL` and
/// `RETURN` produce no event.
pub fn parse_debug(tag: DebugTag<'_>, payload: &str) -> Result<Option<Event>, ParseError> {
    match tag {
        DebugTag::Agent => parse_callback(payload).map(Some),
        DebugTag::Call => parse_call(payload).map(Some),
        DebugTag::Return => Ok(Some(Event::new(EventKind::Return))),
        DebugTag::Other(_) => Ok(None),
    }
}

/// Event for a raw agent line: the fixed-column trace format, or a bare
/// callback token. Anything else is ordinary program output.
pub fn parse_agent_raw(line: &str) -> Result<Option<Event>, ParseError> {
    if line.len() >= TRACE_MIN_LEN {
        return parse_trace_line(line).map(|record| record.map(|record| record.to_event()));
    }
    Ok(parse_callback(line).ok())
}
