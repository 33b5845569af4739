use antarbhukti_core::SfcError;
use antarbhukti_core::sfc::ModelInvariantViolation;
use std::fmt;
use thiserror::Error;

/// A position in an SFC record file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location {
    /// Line, starting from 1.
    pub line: usize,
    /// Column (in characters), starting from 1.
    pub column: usize,
}

impl Location {
    pub(crate) const START: Location = Location { line: 1, column: 1 };

    // The location of the character at `offset` within a string literal starting here.
    pub(crate) fn within_literal(self, offset: usize) -> Location {
        Location {
            line: self.line,
            column: self.column + 1 + offset,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The kinds of [`ParseError`].
#[derive(Debug, Clone, Error)]
pub enum ParseErrorKind {
    /// The record file is malformed.
    #[error("syntax error: {0}")]
    Syntax(String),
    /// A guard or action contains an unexpected character.
    #[error("cannot tokenize expression: {0}")]
    Tokenize(String),
    /// A guard or action is not a well-formed expression.
    #[error("cannot parse expression: {0}")]
    Expression(String),
    /// A transition or the initial step refers to an undeclared step.
    #[error("step '{0}' is not defined")]
    UndefinedStep(String),
    /// Two steps share a name.
    #[error("step '{0}' is defined more than once")]
    DuplicateStep(String),
    /// Two variables share a name.
    #[error("variable '{0}' is declared more than once")]
    DuplicateVariable(String),
    /// A record lacks a required field.
    #[error("{record} record has no '{field}' field")]
    MissingField {
        /// The kind of record.
        record: &'static str,
        /// The missing field.
        field: &'static str,
    },
    /// A record has a field it does not accept.
    #[error("{record} record has unknown field '{field}'")]
    UnknownField {
        /// The kind of record.
        record: &'static str,
        /// The unknown field.
        field: String,
    },
    /// A guard or assignment is ill-typed.
    #[error("{0}")]
    Type(#[source] SfcError),
    /// The SFC as a whole is malformed.
    #[error("{0}")]
    ModelInvariant(ModelInvariantViolation),
}

/// The error type for parsing SFC record files.
#[derive(Debug, Clone, Error)]
#[error("{location}: {kind}")]
pub struct ParseError {
    /// What went wrong.
    pub kind: ParseErrorKind,
    /// Where it went wrong.
    pub location: Location,
}

impl ParseError {
    pub(crate) fn new(kind: ParseErrorKind, location: Location) -> Self {
        Self { kind, location }
    }

    pub(crate) fn syntax(message: impl Into<String>, location: Location) -> Self {
        Self::new(ParseErrorKind::Syntax(message.into()), location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_location() {
        let err = ParseError::new(
            ParseErrorKind::UndefinedStep("Done".to_string()),
            Location { line: 3, column: 14 },
        );
        assert_eq!(err.to_string(), "3:14: step 'Done' is not defined");
        let at = Location { line: 2, column: 5 }.within_literal(3);
        assert_eq!(at, Location { line: 2, column: 9 });
    }
}
