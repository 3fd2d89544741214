use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "taptools-cli")]
#[command(about = "CLI for TapTools wallet trades", long_about = None)]
#[command(version = include_str!("../version.txt").trim_ascii())]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch token trades for a wallet address, one request per input item
    Fetch(FetchArgs),
    /// Keep only trades inside a recent time window
    Filter(FilterArgs),
    /// Select transactions and add human-readable timestamps
    Prettify(PrettifyArgs),
}

/// Where batches are read from and written to.
#[derive(Args, Debug, Clone, Default)]
pub struct BatchArgs {
    /// Input batch file, `-` for stdin. filter/prettify read stdin when omitted;
    /// fetch then runs once for a single empty item.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Treat the whole input document as the payload of a single item
    #[arg(long, default_value_t = false)]
    pub raw: bool,

    /// Output file. Writes to stdout when omitted.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Stake wallet address (stake1...). Items may override it with an "address" field.
    #[arg(short, long)]
    pub address: Option<String>,

    /// Page number for pagination
    #[arg(short, long, default_value_t = 1)]
    pub page: u32,

    /// Number of results per page
    #[arg(long, default_value_t = 10)]
    pub per_page: u32,

    /// Token unit to restrict trades to
    #[arg(short, long)]
    pub unit: Option<String>,

    /// Emit an {"error": ...} record for a failed item instead of aborting
    #[arg(long, default_value_t = false)]
    pub continue_on_fail: bool,

    #[command(flatten)]
    pub batch: BatchArgs,
}

#[derive(Args, Debug, Clone)]
pub struct FilterArgs {
    /// Time window to keep trades from
    #[arg(short, long, default_value = "5m", value_parser = ["5m", "15m", "1h", "4h", "24h", "7d"])]
    pub time_range: String,

    /// Don't emit a diagnostic record when nothing matches
    #[arg(long, default_value_t = false)]
    pub no_filter_info: bool,

    /// Emit an empty batch when nothing matches (wins over filter info)
    #[arg(long, default_value_t = false)]
    pub return_empty: bool,

    #[command(flatten)]
    pub batch: BatchArgs,
}

#[derive(Args, Debug, Clone)]
pub struct PrettifyArgs {
    /// Which transactions to process
    #[arg(short, long, default_value = "all", value_parser = ["all", "first", "last", "latest_time", "earliest_time"])]
    pub mode: String,

    /// Leave out the ISO 8601 rendering
    #[arg(long, default_value_t = false)]
    pub no_iso: bool,

    /// Leave out the local date/time renderings
    #[arg(long, default_value_t = false)]
    pub no_local: bool,

    /// Leave out the UTC string rendering
    #[arg(long, default_value_t = false)]
    pub no_utc: bool,

    /// Leave out the long-form custom rendering
    #[arg(long, default_value_t = false)]
    pub no_custom: bool,

    #[command(flatten)]
    pub batch: BatchArgs,
}
