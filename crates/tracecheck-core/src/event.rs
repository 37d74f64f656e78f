//! Event model shared by the parser, the script builder and the matcher.
//!
//! An [`Event`] is a kind plus up to two string payloads. Matching equality
//! is kind-dependent (see [`Event::compare`]), so `PartialEq` is only the
//! structural comparison used by tests and ignore-set bookkeeping.

use std::fmt;

/// Which side of a call transition the agent instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Boundary {
    /// Caller and callee are both instrumented (`II`).
    Both,
    /// Instrumented caller into an uninstrumented callee (`IU`).
    CallerOnly,
    /// Uninstrumented caller into an instrumented callee (`UI`).
    CalleeOnly,
}

impl Boundary {
    pub const ALL: [Boundary; 3] = [Boundary::Both, Boundary::CallerOnly, Boundary::CalleeOnly];

    /// Two-letter code used by harness directives and diagnostic labels.
    pub fn code(self) -> &'static str {
        match self {
            Self::Both => "II",
            Self::CallerOnly => "IU",
            Self::CalleeOnly => "UI",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|boundary| boundary.code() == code)
    }
}

/// Agent callbacks into the instrumented code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Callback {
    AddBooleanParameter,
    AddCharParameter,
    AddByteParameter,
    AddShortParameter,
    AddIntegerParameter,
    AddLongParameter,
    AddFloatParameter,
    AddDoubleParameter,
    AddObjectParameter,
    AddArrayParameter,
    BeginFrame,
    RemoveParams,
    CreateFrame,
    PopFrame,
    PopFrameAndPush,
    PushIntegralType,
    PushLongType,
    PushFloatType,
    PushDoubleType,
    PushReferenceType,
    PushArrayType,
}

impl Callback {
    pub const ALL: [Callback; 21] = [
        Callback::AddBooleanParameter,
        Callback::AddCharParameter,
        Callback::AddByteParameter,
        Callback::AddShortParameter,
        Callback::AddIntegerParameter,
        Callback::AddLongParameter,
        Callback::AddFloatParameter,
        Callback::AddDoubleParameter,
        Callback::AddObjectParameter,
        Callback::AddArrayParameter,
        Callback::BeginFrame,
        Callback::RemoveParams,
        Callback::CreateFrame,
        Callback::PopFrame,
        Callback::PopFrameAndPush,
        Callback::PushIntegralType,
        Callback::PushLongType,
        Callback::PushFloatType,
        Callback::PushDoubleType,
        Callback::PushReferenceType,
        Callback::PushArrayType,
    ];

    /// Token the agent prints for this callback.
    pub fn token(self) -> &'static str {
        match self {
            Self::AddBooleanParameter => "addBooleanParameter",
            Self::AddCharParameter => "addCharParameter",
            Self::AddByteParameter => "addByteParameter",
            Self::AddShortParameter => "addShortParameter",
            Self::AddIntegerParameter => "addIntegerParameter",
            Self::AddLongParameter => "addLongParameter",
            Self::AddFloatParameter => "addFloatParameter",
            Self::AddDoubleParameter => "addDoubleParameter",
            Self::AddObjectParameter => "addObjectParameter",
            Self::AddArrayParameter => "addArrayParameter",
            Self::BeginFrame => "beginFrame",
            Self::RemoveParams => "removeParams",
            Self::CreateFrame => "createFrame",
            Self::PopFrame => "popFrame",
            Self::PopFrameAndPush => "popFrameAndPush",
            Self::PushIntegralType => "pushIntegralType",
            // The agent emits this misspelling; match it verbatim.
            Self::PushLongType => "pushLonglType",
            Self::PushFloatType => "pushFloatType",
            Self::PushDoubleType => "pushDoubleType",
            Self::PushReferenceType => "pushReferenceType",
            Self::PushArrayType => "pushArrayType",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|callback| callback.token() == token)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    None,
    Error,
    Exit,
    Entry(Boundary),
    Leave(Boundary),
    Call,
    Return,
    Callback(Callback),
}

impl EventKind {
    /// Diagnostic label, e.g. `ENTRY_II`, `CALL`, `createFrame`.
    pub fn label(self) -> String {
        match self {
            Self::None => "NONE".to_string(),
            Self::Error => "ERROR".to_string(),
            Self::Exit => "EXIT".to_string(),
            Self::Entry(boundary) => format!("ENTRY_{}", boundary.code()),
            Self::Leave(boundary) => format!("LEAVE_{}", boundary.code()),
            Self::Call => "CALL".to_string(),
            Self::Return => "RETURN".to_string(),
            Self::Callback(callback) => callback.token().to_string(),
        }
    }

    /// Inverse of [`EventKind::label`].
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "NONE" => return Some(Self::None),
            "ERROR" => return Some(Self::Error),
            "EXIT" => return Some(Self::Exit),
            "CALL" => return Some(Self::Call),
            "RETURN" => return Some(Self::Return),
            _ => {}
        }
        if let Some(code) = label.strip_prefix("ENTRY_") {
            return Boundary::from_code(code).map(Self::Entry);
        }
        if let Some(code) = label.strip_prefix("LEAVE_") {
            return Boundary::from_code(code).map(Self::Leave);
        }
        Callback::from_token(label).map(Self::Callback)
    }

    /// Kinds the matcher never acts on.
    pub fn is_inert(self) -> bool {
        matches!(self, Self::None | Self::Error)
    }

    fn compared_args(self) -> usize {
        match self {
            Self::Call => 2,
            Self::Entry(_) | Self::Leave(_) => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// The first field on which two events disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mismatch {
    Kind,
    Arg1,
    Arg2,
}

impl Mismatch {
    pub fn field_name(self) -> &'static str {
        match self {
            Self::Kind => "kind",
            Self::Arg1 => "arg1",
            Self::Arg2 => "arg2",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub arg1: String,
    pub arg2: String,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            arg1: String::new(),
            arg2: String::new(),
        }
    }

    pub fn with_arg(kind: EventKind, arg1: impl Into<String>) -> Self {
        Self {
            kind,
            arg1: arg1.into(),
            arg2: String::new(),
        }
    }

    pub fn with_args(kind: EventKind, arg1: impl Into<String>, arg2: impl Into<String>) -> Self {
        Self {
            kind,
            arg1: arg1.into(),
            arg2: arg2.into(),
        }
    }

    pub fn exit() -> Self {
        Self::new(EventKind::Exit)
    }

    pub fn error() -> Self {
        Self::new(EventKind::Error)
    }

    pub fn callback(callback: Callback) -> Self {
        Self::new(EventKind::Callback(callback))
    }

    /// Compare against `expected` with the matcher's rule: kinds must be
    /// equal, `CALL` also checks both args, entry/leave kinds check `arg1`,
    /// every other kind compares on kind alone. `None` means the events match.
    pub fn compare(&self, expected: &Event) -> Option<Mismatch> {
        if self.kind != expected.kind {
            return Some(Mismatch::Kind);
        }
        let args = self.kind.compared_args();
        if args >= 1 && self.arg1 != expected.arg1 {
            return Some(Mismatch::Arg1);
        }
        if args >= 2 && self.arg2 != expected.arg2 {
            return Some(Mismatch::Arg2);
        }
        None
    }

    pub fn matches(&self, expected: &Event) -> bool {
        self.compare(expected).is_none()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.arg1.is_empty() {
            write!(f, "  {}", self.arg1)?;
        }
        if !self.arg2.is_empty() {
            write!(f, "  {}", self.arg2)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Boundary, Callback, Event, EventKind, Mismatch};

    #[test]
    fn labels_round_trip_for_every_kind() {
        let mut kinds = vec![
            EventKind::None,
            EventKind::Error,
            EventKind::Exit,
            EventKind::Call,
            EventKind::Return,
        ];
        for boundary in Boundary::ALL {
            kinds.push(EventKind::Entry(boundary));
            kinds.push(EventKind::Leave(boundary));
        }
        kinds.extend(Callback::ALL.into_iter().map(EventKind::Callback));

        for kind in kinds {
            assert_eq!(EventKind::from_label(&kind.label()), Some(kind), "{kind}");
        }
        assert_eq!(EventKind::from_label("ENTRY_XX"), None);
        assert_eq!(EventKind::from_label("pushLongType"), None);
    }

    #[test]
    fn call_compares_both_args_in_order() {
        let expected = Event::with_args(EventKind::Call, "T.callee", "T.caller");
        let got = Event::with_args(EventKind::Call, "T.other", "T.nobody");
        assert_eq!(got.compare(&expected), Some(Mismatch::Arg1));

        let got = Event::with_args(EventKind::Call, "T.callee", "T.nobody");
        assert_eq!(got.compare(&expected), Some(Mismatch::Arg2));

        let got = Event::with_args(EventKind::Call, "T.callee", "T.caller");
        assert_eq!(got.compare(&expected), None);
    }

    #[test]
    fn entry_and_leave_compare_first_arg_only() {
        let expected = Event::with_args(EventKind::Leave(Boundary::Both), "T.m", "ignored");
        let got = Event::with_arg(EventKind::Leave(Boundary::Both), "T.m");
        assert!(got.matches(&expected));

        let got = Event::with_arg(EventKind::Leave(Boundary::Both), "T.n");
        assert_eq!(got.compare(&expected), Some(Mismatch::Arg1));

        let got = Event::with_arg(EventKind::Leave(Boundary::CalleeOnly), "T.m");
        assert_eq!(got.compare(&expected), Some(Mismatch::Kind));
    }

    #[test]
    fn other_kinds_compare_on_kind_alone() {
        let expected = Event::callback(Callback::CreateFrame);
        let got = Event::with_args(EventKind::Callback(Callback::CreateFrame), "x", "y");
        assert!(got.matches(&expected));
        assert!(Event::new(EventKind::Return).matches(&Event::with_arg(EventKind::Return, "z")));
    }

    #[test]
    fn display_omits_empty_args() {
        assert_eq!(Event::exit().to_string(), "EXIT");
        assert_eq!(
            Event::with_args(EventKind::Call, "A.b", "A.main").to_string(),
            "CALL  A.b  A.main"
        );
    }
}
