//! agent-bench binary.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use agent_bench::cli::{self, Cli};

/// Logs go to stderr so `--json` output on stdout stays parseable.
/// `RUST_LOG`, when set, wins over `--log-level`.
fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::parse_cli();
    init_tracing(&cli);
    cli::run_with_cli(cli).await
}
