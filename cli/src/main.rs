//! CLI for covfetch
//!
//! Commands:
//! - fetch: Retrieve coverage from a running agent into a store file
//! - merge: Merge several store files into one

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "covfetch")]
#[command(about = "covfetch - retrieve coverage dumps from remote coverage agents", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump (and by default reset) an agent's coverage into a local store
    Fetch(commands::fetch::FetchArgs),

    /// Merge store files offline
    Merge(commands::merge::MergeArgs),
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch(args) => {
            init_tracing(args.verbose);
            commands::fetch::run(args).await
        }
        Commands::Merge(args) => {
            init_tracing(args.verbose);
            commands::merge::run(args)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::path::PathBuf;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_fetch_defaults() {
        let cli = Cli::try_parse_from(["covfetch", "fetch", "--host", "ci-agent", "--port", "6300"])
            .unwrap();
        let Commands::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.host, "ci-agent");
        assert_eq!(args.port, 6300);
        assert_eq!(args.output, PathBuf::from("target/covfetch/coverage.exec"));
        assert!(!args.no_reset);
        assert!(!args.fail_on_error);
        assert_eq!(args.retries, 0);
    }

    #[test]
    fn test_merge_requires_inputs() {
        assert!(Cli::try_parse_from(["covfetch", "merge", "--output", "all.exec"]).is_err());
        let cli = Cli::try_parse_from(["covfetch", "merge", "a.exec", "b.exec", "-o", "all.exec"])
            .unwrap();
        let Commands::Merge(args) = cli.command else {
            panic!("expected merge");
        };
        assert_eq!(args.inputs.len(), 2);
    }
}
