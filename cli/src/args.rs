use std::path::PathBuf;

use clap::{Parser, ValueEnum, ValueHint};
use tally_config::Overrides;
use tally_engine::ItemErrorPolicy;

/// Value a mangacollec collection from BDfugue and Amazon offers.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub(crate) struct Cli {
    /// Collection owner.
    pub(crate) username: String,

    /// Config file (default: ~/.tally/config.toml).
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub(crate) config: Option<PathBuf>,

    /// API base URL, overriding `api.base_url`.
    #[arg(long)]
    pub(crate) base_url: Option<String>,

    /// Token file, overriding `credentials.token_file`. Ignored when TALLY_TOKEN is set.
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub(crate) token_file: Option<PathBuf>,

    /// Stop waiting for a token after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub(crate) wait_timeout: Option<u64>,

    /// Offer cache file, overriding `cache.file`.
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with = "no_cache")]
    pub(crate) cache_file: Option<PathBuf>,

    /// Keep offers in memory for this run only.
    #[arg(long)]
    pub(crate) no_cache: bool,

    /// What to do with a volume no source can price.
    #[arg(long, value_enum)]
    pub(crate) on_item_error: Option<ErrorPolicyArg>,

    /// Print the final state as JSON instead of the summary line.
    #[arg(long)]
    pub(crate) json: bool,

    /// Do not print intermediate progress.
    #[arg(long, short)]
    pub(crate) quiet: bool,
}

impl Cli {
    /// Flag values that take precedence over the config file.
    pub(crate) fn overrides(&self) -> Overrides {
        Overrides {
            base_url: self.base_url.clone(),
            token_file: self.token_file.clone(),
            wait_timeout_secs: self.wait_timeout,
            cache_file: self.cache_file.clone(),
            no_cache: self.no_cache,
            on_item_error: self.on_item_error.map(Into::into),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum ErrorPolicyArg {
    Abort,
    Skip,
}

impl From<ErrorPolicyArg> for ItemErrorPolicy {
    fn from(arg: ErrorPolicyArg) -> Self {
        match arg {
            ErrorPolicyArg::Abort => ItemErrorPolicy::Abort,
            ErrorPolicyArg::Skip => ItemErrorPolicy::Skip,
        }
    }
}
