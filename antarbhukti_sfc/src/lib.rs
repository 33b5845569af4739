//! Parser for the textual SFC record format.
//!
//! An SFC file is a sequence of `name = value` tables,
//! whose values are lists and dictionaries of quoted strings:
//!
//! ```text
//! # comment
//! steps = [
//!     {"name": "Init", "function": "x := 0; y := input"},
//!     {"name": "Done", "function": ""},
//! ]
//! transitions = [
//!     {"src": "Init", "tgt": "Done", "guard": "input > 0"},
//! ]
//! variables = ["input", {"name": "flag", "type": "bool", "init": "false"}]
//! initial_step = "Init"
//! ```
//!
//! Guards and actions are parsed as expressions.
//! Variables that are used but not declared are added implicitly,
//! with their type inferred from the way they are used.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod builder;
mod error;
mod expr;
mod record;

use anyhow::Context;
use antarbhukti_core::Sfc;
pub use error::{Location, ParseError, ParseErrorKind};
pub use record::{Spanned, Value, ValueKind};
use log::info;
use std::path::Path;

/// Parses an SFC from the text of a record file.
///
/// ```
/// let sfc = antarbhukti_sfc::parse(r#"
///     steps = [{"name": "Init", "function": "n := 0"}, {"name": "Done"}]
///     transitions = [{"src": "Init", "tgt": "Done", "guard": "n = 0"}]
///     initial_step = "Init"
/// "#).expect("well-formed SFC");
/// assert_eq!(sfc.steps().count(), 2);
///
/// let err = antarbhukti_sfc::parse(r#"
///     steps = [{"name": "Init"}]
///     transitions = [{"src": "Init", "tgt": "Done"}]
///     initial_step = "Init"
/// "#).expect_err("undefined step");
/// assert_eq!(err.location.line, 3);
/// ```
pub fn parse(text: &str) -> Result<Sfc, ParseError> {
    let tables = record::read(text)?;
    builder::build(tables)
}

/// Builds an SFC from record tables,
/// such as those another front end extracts from its own format.
///
/// The tables are the ones of the record file layout:
/// `steps`, `transitions`, `variables` and `initial_step`.
pub fn build(tables: Vec<(Spanned, Value)>) -> Result<Sfc, ParseError> {
    builder::build(tables)
}

/// Reads and parses an SFC record file.
pub fn load(path: &Path) -> anyhow::Result<Sfc> {
    let time = std::time::Instant::now();
    info!(target: "parser", "parsing SFC file '{}'", path.display());
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read file '{}'", path.display()))?;
    let sfc = parse(&text)
        .with_context(|| format!("failed to parse SFC in '{}'", path.display()))?;
    info!(target: "parser", "parsing complete in {:?}", time.elapsed());
    Ok(sfc)
}
