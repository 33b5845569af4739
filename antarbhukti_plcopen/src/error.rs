use antarbhukti_sfc::{Location, ParseError};
use thiserror::Error;

/// The kinds of [`PlcOpenError::Document`] errors.
#[derive(Debug, Error)]
pub enum DocumentErrorKind {
    /// The document is not well-formed XML.
    #[error("malformed XML: {0}")]
    Xml(#[source] quick_xml::Error),
    /// An element lacks a required attribute.
    #[error("<{element}> has no '{attribute}' attribute")]
    MissingAttribute {
        /// The element.
        element: String,
        /// The missing attribute.
        attribute: &'static str,
    },
    /// An attribute has a value that cannot be used.
    #[error("attribute '{attribute}' has invalid value '{value}'")]
    InvalidAttribute {
        /// The attribute.
        attribute: &'static str,
        /// Its value.
        value: String,
    },
    /// No POU of the project has an SFC body.
    #[error("no POU has an SFC body")]
    NoSfc,
    /// Two elements of the same SFC body share a `localId`.
    #[error("localId {0} is used more than once")]
    DuplicateId(u64),
    /// A connection refers to a `localId` no element has.
    #[error("connection to unknown localId {0}")]
    UnknownId(u64),
    /// An action block refers to an action the POU does not define in ST.
    #[error("action '{0}' is not defined in ST")]
    UnknownAction(String),
    /// A transition refers to a condition the POU does not define in ST.
    #[error("transition '{0}' is not defined in ST")]
    UnknownTransition(String),
    /// The elements are connected in a way SFCs do not allow.
    #[error("{0}")]
    Connection(String),
    /// A construct with no counterpart in the SFC model.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// The textual SFC of an ST body is malformed.
    #[error("syntax error: {0}")]
    Syntax(String),
}

/// The error type for importing PLCopen XML documents.
#[derive(Debug, Error)]
pub enum PlcOpenError {
    /// The document does not describe an SFC.
    #[error("{location}: {kind}")]
    Document {
        /// What went wrong.
        kind: DocumentErrorKind,
        /// Where it went wrong.
        location: Location,
    },
    /// The SFC the document describes is malformed.
    #[error(transparent)]
    Sfc(#[from] ParseError),
}

impl PlcOpenError {
    pub(crate) fn new(kind: DocumentErrorKind, location: Location) -> Self {
        Self::Document { kind, location }
    }

    /// Where the error happened in the document.
    pub fn location(&self) -> Location {
        match self {
            PlcOpenError::Document { location, .. } => *location,
            PlcOpenError::Sfc(err) => err.location,
        }
    }
}
