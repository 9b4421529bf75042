//! Merge command implementation

use crate::output;
use anyhow::{Context, Result};
use clap::Args;
use covfetch_store::merge_stores;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Store files to merge
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Store file to write; replaced unless also listed as an input
    #[arg(short, long)]
    pub output: PathBuf,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn run(args: MergeArgs) -> Result<()> {
    let summary = merge_stores(&args.inputs, &args.output)
        .with_context(|| format!("Failed to merge into {}", args.output.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        output::success(&format!(
            "Merged {} stores into {}",
            args.inputs.len(),
            args.output.display()
        ));
        output::print_store(&summary);
    }
    Ok(())
}
