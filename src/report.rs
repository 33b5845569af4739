use antarbhukti_core::VerificationResult;
use serde::Serialize;
use std::fmt::Display;

#[derive(Serialize)]
pub(crate) struct Report {
    pub(crate) source: String,
    pub(crate) target: String,
    pub(crate) max_loop_unroll: u32,
    #[serde(flatten)]
    pub(crate) result: VerificationResult,
}

impl Report {
    pub(crate) fn print(&self, json: bool) -> anyhow::Result<()> {
        if json {
            let report = serde_json::ser::to_string_pretty(&self)?;
            println!("{report}");
        } else {
            println!("{self}");
        };
        Ok(())
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Antarbhukti results for {} against {} (loop unroll {})",
            self.source, self.target, self.max_loop_unroll
        )?;
        write!(f, "{}", self.result)
    }
}
