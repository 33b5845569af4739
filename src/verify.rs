use antarbhukti_core::{Sfc, VerifyConfig, verify};
use clap::Parser;

use crate::report::Report;

/// Verification bounds and resources
#[derive(Debug, Clone, Parser)]
pub(crate) struct VerifyArgs {
    /// Times a step may be re-entered within one path
    #[arg(short = 'u', long, default_value_t = 2)]
    pub(crate) max_loop_unroll: u32,
    /// Max number of transitions in one path
    #[arg(long)]
    pub(crate) max_path_len: Option<usize>,
    /// Time allowed to each solver call (in milliseconds)
    #[arg(short, long, default_value_t = 5000)]
    pub(crate) timeout: u64,
    /// Time allowed to the whole verification (in milliseconds)
    #[arg(short, long)]
    pub(crate) deadline: Option<u64>,
    /// Number of worker threads (0 picks one per core)
    #[arg(long, default_value_t = 0)]
    pub(crate) threads: usize,
    /// Work bound of each solver call
    #[arg(long, default_value_t = 4096)]
    pub(crate) search_bound: usize,
}

impl VerifyArgs {
    pub(crate) fn config(&self) -> VerifyConfig {
        VerifyConfig {
            max_loop_unroll: self.max_loop_unroll,
            per_call_timeout_ms: self.timeout,
            global_deadline_ms: self.deadline,
            parallelism: self.threads,
            max_path_len: self.max_path_len,
            search_bound: self.search_bound,
        }
    }

    pub(crate) fn verify(
        &self,
        source: (String, Sfc),
        target: (String, Sfc),
    ) -> anyhow::Result<Report> {
        if self.search_bound == 0 {
            anyhow::bail!("search bound must be positive");
        }
        let result = verify(&source.1, &target.1, &self.config());
        Ok(Report {
            source: source.0,
            target: target.0,
            max_loop_unroll: self.max_loop_unroll,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_config() {
        let args = VerifyArgs::parse_from(["verify"]);
        let config = args.config();
        let default = VerifyConfig::default();
        assert_eq!(config.max_loop_unroll, default.max_loop_unroll);
        assert_eq!(config.per_call_timeout_ms, default.per_call_timeout_ms);
        assert_eq!(config.global_deadline_ms, default.global_deadline_ms);
        assert_eq!(config.parallelism, default.parallelism);
        assert_eq!(config.max_path_len, default.max_path_len);
        assert_eq!(config.search_bound, default.search_bound);
    }
}
