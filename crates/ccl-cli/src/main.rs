mod cli;

use clap::Parser;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = cli::Cli::parse();
    if let Err(err) = cli::run(cli) {
        tracing::error!(error = %err, "ccl-synth failed");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
