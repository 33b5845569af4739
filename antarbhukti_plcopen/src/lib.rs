//! Importer for SFCs in PLCopen TC6 XML documents.
//!
//! The SFC is taken from the first POU whose body is either
//!
//! - a graphical `<SFC>` body, whose steps, transitions, jumps and selection branches
//!   are connected by `localId`, and whose action blocks and conditions
//!   are written in ST, in place or as POU-level actions and transitions;
//! - an `<ST>` body holding a textual SFC, made of
//!   `INITIAL_STEP`/`STEP ... END_STEP` and `TRANSITION ... FROM ... TO ... := ... END_TRANSITION` blocks.
//!
//! The variables of the POU interface are declared with their elementary type and initial value.
//! ST actions and conditions are then read as those of SFC record files,
//! see [`antarbhukti_sfc`].

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod graph;
mod parser;
mod records;
mod textual;

use anyhow::Context;
use antarbhukti_core::Sfc;
use antarbhukti_sfc::Location;
pub use error::{DocumentErrorKind, PlcOpenError};
use log::{info, warn};
use std::path::Path;

/// Imports the SFC of a PLCopen XML document.
///
/// ```
/// let sfc = antarbhukti_plcopen::parse(r#"
///     <project><types><pous><pou name="main" pouType="program">
///       <body><SFC>
///         <step localId="1" name="Init" initialStep="true"/>
///         <transition localId="2">
///           <connectionPointIn><connection refLocalId="1"/></connectionPointIn>
///           <condition><inline name=""><ST><xhtml>TRUE</xhtml></ST></inline></condition>
///         </transition>
///         <step localId="3" name="Done">
///           <connectionPointIn><connection refLocalId="2"/></connectionPointIn>
///         </step>
///       </SFC></body>
///     </pou></pous></types></project>
/// "#).expect("well-formed SFC");
/// assert_eq!(sfc.steps().count(), 2);
/// assert_eq!(sfc.transitions().count(), 1);
/// ```
pub fn parse(text: &str) -> Result<Sfc, PlcOpenError> {
    let pous = parser::parse(text)?;
    let mut sfcs = pous.iter().filter_map(|pou| {
        if !pou.nodes.is_empty() {
            Some((pou, None))
        } else {
            let code = pou.program.as_ref().filter(|code| textual::is_sfc(code))?;
            Some((pou, Some(code)))
        }
    });
    let Some((pou, code)) = sfcs.next() else {
        return Err(PlcOpenError::new(
            DocumentErrorKind::NoSfc,
            Location { line: 1, column: 1 },
        ));
    };
    for (other, _) in sfcs {
        warn!(target: "parser", "{}: ignoring SFC of POU '{}'", other.location, other.name);
    }
    info!(target: "parser", "importing SFC of POU '{}'", pou.name);
    let records = match code {
        Some(code) => textual::records(pou, code)?,
        None => graph::records(pou)?,
    };
    Ok(antarbhukti_sfc::build(records.into_tables(pou.location))?)
}

/// Reads a PLCopen XML document and imports its SFC.
pub fn load(path: &Path) -> anyhow::Result<Sfc> {
    let time = std::time::Instant::now();
    info!(target: "parser", "parsing PLCopen XML file '{}'", path.display());
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read file '{}'", path.display()))?;
    let sfc = parse(&text)
        .with_context(|| format!("failed to import SFC from '{}'", path.display()))?;
    info!(target: "parser", "parsing complete in {:?}", time.elapsed());
    Ok(sfc)
}
