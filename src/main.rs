use std::process::ExitCode;

use antarbhukti::Cli;
use clap::Parser;

fn main() -> anyhow::Result<ExitCode> {
    human_panic::setup_panic!();
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.verbosity.log_level_filter())
        .init();
    cli.run()
}
