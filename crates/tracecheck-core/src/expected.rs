//! Expected-sequence construction from harness declarations.

use std::fmt;

use crate::error::DeclarationError;
use crate::event::{Boundary, Callback, Event, EventKind};

/// A parsed `<TYPE> <caller> <callee>` declaration payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub boundary: Boundary,
    pub caller: String,
    pub callee: String,
}

impl Declaration {
    pub fn parse(payload: &str) -> Result<Self, DeclarationError> {
        let mut fields = payload.split_whitespace();
        let code = fields
            .next()
            .ok_or(DeclarationError::MissingField { field: "type" })?;
        let boundary = Boundary::from_code(code).ok_or_else(|| DeclarationError::InvalidType {
            code: code.to_string(),
        })?;
        let caller = fields
            .next()
            .ok_or(DeclarationError::MissingField { field: "caller" })?;
        let callee = fields
            .next()
            .ok_or(DeclarationError::MissingField { field: "callee" })?;
        Ok(Self {
            boundary,
            caller: caller.to_string(),
            callee: callee.to_string(),
        })
    }

    /// Steps the agent must report for this call. Only the both-instrumented
    /// shape is defined.
    pub fn steps(&self) -> Result<Vec<Event>, DeclarationError> {
        match self.boundary {
            Boundary::Both => Ok(vec![
                Event::with_arg(EventKind::Entry(Boundary::Both), &self.callee),
                Event::callback(Callback::CreateFrame),
                Event::with_args(EventKind::Call, &self.callee, &self.caller),
                Event::new(EventKind::Return),
                Event::with_arg(EventKind::Leave(Boundary::Both), &self.callee),
                Event::callback(Callback::PopFrameAndPush),
            ]),
            other => Err(DeclarationError::Unsupported { code: other.code() }),
        }
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.boundary.code(), self.caller, self.callee)
    }
}

/// Ordered steps for one test, possibly merged from several continued
/// declarations. Each step remembers the declaration that contributed it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedScript {
    steps: Vec<Event>,
    owners: Vec<usize>,
    declarations: Vec<Declaration>,
    closed: bool,
}

impl ExpectedScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the steps for `declaration`. Declarations that produce no
    /// steps are rejected and leave the script untouched.
    pub fn push(&mut self, declaration: Declaration) -> Result<(), DeclarationError> {
        let steps = declaration.steps()?;
        let owner = self.declarations.len();
        self.owners.extend(std::iter::repeat(owner).take(steps.len()));
        self.steps.extend(steps);
        self.declarations.push(declaration);
        Ok(())
    }

    /// Terminate the script with `EXIT`. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.steps.push(Event::exit());
        self.owners.push(self.declarations.len().saturating_sub(1));
        self.closed = true;
    }

    pub fn steps(&self) -> &[Event] {
        &self.steps
    }

    pub fn get(&self, index: usize) -> Option<&Event> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    /// Declaration that contributed step `index`.
    pub fn declaration_for(&self, index: usize) -> Option<&Declaration> {
        let owner = *self.owners.get(index)?;
        self.declarations.get(owner)
    }
}
