use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "netwatch-core-rs",
    version,
    about = "Device health and availability monitoring core"
)]
pub struct Args {
    /// Create the event store schema and exit.
    #[arg(long, default_value_t = false)]
    pub ensure_schema: bool,
}
