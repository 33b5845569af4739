//! # Antarbhukti
//!
//! Antarbhukti checks that an upgraded Sequential Function Chart (SFC)
//! preserves the behavior of the original one.
//!
//! Both SFCs are converted to Petri nets,
//! their execution paths are enumerated up to a loop-unrolling bound,
//! and each path of the source is checked to be reproduced by some path of the target.
//! When it is not, Antarbhukti reports the step where the target diverges,
//! together with a counterexample input.

mod report;
mod verify;

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use antarbhukti_core::{Sfc, Verdict};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use verify::VerifyArgs;

/// Antarbhukti reads SFCs in different formats.
#[deny(missing_docs)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Format {
    /// Record files of `steps`, `transitions`, `variables` and `initial_step` tables.
    Records,
    /// PLCopen TC6 XML documents, with either a graphical SFC body
    /// or a textual SFC written in ST.
    Plcopen,
}

impl Format {
    // PLCopen documents are recognized by the .xml extension.
    fn detect(path: &Path) -> Format {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("xml") => Format::Plcopen,
            _ => Format::Records,
        }
    }

    fn load(self, path: &Path) -> anyhow::Result<Sfc> {
        match self {
            Format::Records => antarbhukti_sfc::load(path),
            Format::Plcopen => antarbhukti_plcopen::load(path),
        }
    }
}

/// Antarbhukti's available commands.
#[deny(missing_docs)]
#[derive(Subcommand)]
enum Commands {
    /// Validate the syntactical and semantical correctness of the given SFC files, without verifying them.
    ///
    /// EXAMPLE: antarbhukti validate PATH/TO/SFC
    /// EXAMPLE: antarbhukti validate PATH/TO/SFC ANOTHER/SFC
    #[clap(verbatim_doc_comment)]
    Validate {
        /// Paths of the SFC files.
        #[arg(required = true, value_hint = clap::ValueHint::FilePath)]
        files: Vec<PathBuf>,
    },
}

/// A containment checker for upgraded Sequential Function Charts.
///
/// Antarbhukti verifies that every behavior of the SOURCE SFC
/// is reproduced by the TARGET SFC,
/// and reports where the target diverges otherwise.
///
/// Exits with 0 when the target contains the source,
/// 1 when it diverges, and 2 when containment could not be decided.
#[derive(Parser)]
#[deny(missing_docs)]
#[command(
    version,
    about,
    long_about,
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
pub struct Cli {
    /// Path of the original SFC file.
    #[arg(required = true, value_hint = clap::ValueHint::FilePath)]
    source: Option<PathBuf>,
    /// Path of the upgraded SFC file.
    #[arg(required = true, value_hint = clap::ValueHint::FilePath)]
    target: Option<PathBuf>,
    /// Format of the SFC files.
    ///
    /// By default, files with the .xml extension are read as PLCopen XML
    /// and any other file as a record file.
    #[arg(short, long, value_enum, global = true)]
    format: Option<Format>,
    /// Args for verification.
    #[clap(flatten)]
    args: VerifyArgs,
    /// Print JSON-serialized final verification report.
    ///
    /// By default, Antarbhukti prints a user-friendly report at the end of verification.
    /// This flag has the report printed in JSON format instead.
    #[arg(long)]
    json: bool,
    /// Verbose output
    #[command(flatten)]
    pub verbosity: clap_verbosity_flag::Verbosity,
    /// Actions other than verification.
    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    /// Runs the requested command, returning the process' exit code.
    pub fn run(self) -> anyhow::Result<ExitCode> {
        match self.command {
            Some(Commands::Validate { files }) => {
                for file in &files {
                    let name = model_name(file);
                    eprint!("Processing '{name}'...");
                    let _sfc = load(file, self.format)?;
                    // At this point the SFC has been validated
                    eprintln!(" done");
                    println!("SFC '{name}' successfully validated");
                }
                Ok(ExitCode::SUCCESS)
            }
            None => {
                let (Some(source), Some(target)) = (self.source, self.target) else {
                    anyhow::bail!("both a source and a target SFC are required");
                };
                eprint!("Processing SFCs...");
                let source = (model_name(&source), load(&source, self.format)?);
                let target = (model_name(&target), load(&target, self.format)?);
                eprintln!(" done");
                eprint!("Verification in progress...");
                let report = self.args.verify(source, target)?;
                eprintln!(" done!");
                report.print(self.json)?;
                info!(target: "verify", "exiting with verdict {}", report.result.verdict);
                Ok(exit_code(report.result.verdict))
            }
        }
    }
}

fn model_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_owned())
}

fn load(path: &Path, format: Option<Format>) -> anyhow::Result<Sfc> {
    let format = format.unwrap_or_else(|| Format::detect(path));
    info!(target: "parser", "reading '{}' as {format:?}", path.display());
    format.load(path)
}

fn exit_code(verdict: Verdict) -> ExitCode {
    match verdict {
        Verdict::Equivalent | Verdict::TargetSupersedes => ExitCode::SUCCESS,
        Verdict::Diverges => ExitCode::from(1),
        Verdict::Unknown => ExitCode::from(2),
    }
}

// From Clap tutorial <https://docs.rs/clap/latest/clap/_derive/_tutorial/index.html#testing>
#[test]
fn verify_cli() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
}

#[test]
fn parse_cli() {
    let cli = Cli::try_parse_from(["antarbhukti", "old.txt", "new.txt", "-u", "3", "--json"])
        .expect("verification arguments");
    assert!(cli.command.is_none());
    assert_eq!(cli.source, Some(PathBuf::from("old.txt")));
    assert_eq!(cli.args.max_loop_unroll, 3);
    assert!(cli.json);

    let cli = Cli::try_parse_from(["antarbhukti", "validate", "a.txt", "b.txt"])
        .expect("validate subcommand");
    assert!(matches!(cli.command, Some(Commands::Validate { files }) if files.len() == 2));

    assert!(Cli::try_parse_from(["antarbhukti", "old.txt"]).is_err());

    let cli = Cli::try_parse_from(["antarbhukti", "old.sfc", "new.sfc", "--format", "plcopen"])
        .expect("explicit format");
    assert_eq!(cli.format, Some(Format::Plcopen));
}

#[test]
fn detect_format() {
    assert_eq!(Format::detect(Path::new("model/old.xml")), Format::Plcopen);
    assert_eq!(Format::detect(Path::new("NEW.XML")), Format::Plcopen);
    assert_eq!(Format::detect(Path::new("old.txt")), Format::Records);
    assert_eq!(Format::detect(Path::new("old")), Format::Records);
}
