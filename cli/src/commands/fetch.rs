//! Fetch command implementation

use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use covfetch_client::retry::retry_with_backoff;
use covfetch_client::{ClientConfig, Failure, RetrieveOptions, Retriever};
use covfetch_shared::utils::parse_duration;
use covfetch_store::StoreConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::warn;

const RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Host name or IP address of the coverage agent
    #[arg(long, env = "COVFETCH_HOST")]
    pub host: String,

    /// TCP port of the coverage agent
    #[arg(short, long, env = "COVFETCH_PORT")]
    pub port: u32,

    /// Store file to merge the coverage into
    #[arg(
        short,
        long,
        env = "COVFETCH_OUTPUT",
        default_value = "target/covfetch/coverage.exec"
    )]
    pub output: PathBuf,

    /// Leave the agent's counters as they are after the dump
    #[arg(long)]
    pub no_reset: bool,

    /// Exit non-zero when retrieval fails (2 for bad input, 1 otherwise)
    #[arg(long, env = "COVFETCH_FAIL_ON_ERROR")]
    pub fail_on_error: bool,

    /// Extra attempts after a connection-level failure
    #[arg(long, default_value_t = 0)]
    pub retries: u32,

    /// Connect timeout (e.g., "5s", "500ms")
    #[arg(long)]
    pub connect_timeout: Option<String>,

    /// Deadline for the whole dump once connected (e.g., "30s", "2m")
    #[arg(long)]
    pub read_timeout: Option<String>,

    /// What to do with an unreadable existing store: fail or discard
    #[arg(long)]
    pub on_corrupt: Option<String>,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl FetchArgs {
    fn options(&self) -> Result<RetrieveOptions> {
        let mut client = ClientConfig::default();
        if let Some(value) = &self.connect_timeout {
            client.connect_timeout =
                parse_duration(value).context("Failed to parse connect timeout")?;
        }
        if let Some(value) = &self.read_timeout {
            client.read_timeout = parse_duration(value).context("Failed to parse read timeout")?;
        }

        let mut store = StoreConfig::default();
        if let Some(value) = &self.on_corrupt {
            store.on_corrupt = value.parse()?;
        }
        Ok(RetrieveOptions { client, store })
    }
}

pub async fn run(args: FetchArgs) -> Result<ExitCode> {
    let options = args.options()?;

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        // A failure here is reported by validation as a missing directory
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!(dir = %parent.display(), "failed to create output directory: {}", e);
        }
    }

    let retriever = Retriever::with_options(options);
    let retriever = &retriever;
    let host = args.host.as_str();
    let port = args.port;
    let output = args.output.as_path();
    let reset = !args.no_reset;

    let result = retry_with_backoff(
        "coverage retrieval",
        args.retries,
        RETRY_DELAY,
        Failure::is_retryable,
        move || retriever.retrieve(host, port, output, reset),
    )
    .await;

    match result {
        Ok(outcome) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                output::print_outcome(&outcome);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            let kind = failure.kind();
            warn!(kind = %kind, "coverage retrieval failed: {}", failure);
            if args.json {
                let report = serde_json::json!({
                    "category": failure.category(),
                    "kind": kind,
                    "message": failure.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            let code = exit_status(&failure, args.fail_on_error);
            if code == 0 {
                output::warning(&format!("Coverage not retrieved ({}): {}", kind, failure));
            } else {
                output::error(&format!("Coverage not retrieved ({}): {}", kind, failure));
            }
            Ok(ExitCode::from(code))
        }
    }
}

/// Process exit status for a failed retrieval
fn exit_status(failure: &Failure, fail_on_error: bool) -> u8 {
    match (fail_on_error, failure.is_validation()) {
        (false, _) => 0,
        (true, true) => 2,
        (true, false) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covfetch_client::{TransportError, ValidationError};
    use covfetch_store::CorruptStorePolicy;

    fn args() -> FetchArgs {
        FetchArgs {
            host: "localhost".into(),
            port: 6300,
            output: PathBuf::from("coverage.exec"),
            no_reset: false,
            fail_on_error: false,
            retries: 0,
            connect_timeout: None,
            read_timeout: None,
            on_corrupt: None,
            json: false,
            verbose: false,
        }
    }

    #[test]
    fn test_options_from_args() {
        let args = FetchArgs {
            connect_timeout: Some("500ms".into()),
            read_timeout: Some("2m".into()),
            on_corrupt: Some("discard".into()),
            ..args()
        };
        let options = args.options().unwrap();
        assert_eq!(options.client.connect_timeout, Duration::from_millis(500));
        assert_eq!(options.client.read_timeout, Duration::from_secs(120));
        assert_eq!(options.store.on_corrupt, CorruptStorePolicy::Discard);
    }

    #[test]
    fn test_bad_options_are_rejected() {
        let bad_timeout = FetchArgs {
            read_timeout: Some("soon".into()),
            ..args()
        };
        assert!(bad_timeout.options().is_err());

        let bad_policy = FetchArgs {
            on_corrupt: Some("overwrite".into()),
            ..args()
        };
        assert!(bad_policy.options().is_err());
    }

    #[test]
    fn test_exit_status() {
        let invalid = Failure::from(ValidationError::InvalidPort(0));
        let truncated = Failure::from(TransportError::StreamTruncated { units: 0 });

        assert_eq!(exit_status(&invalid, false), 0);
        assert_eq!(exit_status(&truncated, false), 0);
        assert_eq!(exit_status(&invalid, true), 2);
        assert_eq!(exit_status(&truncated, true), 1);
    }
}
