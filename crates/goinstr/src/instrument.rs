use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use colored::Colorize;
use goinstr_engine::consts::{DEFAULT_AGENT_VARIABLE, DEFAULT_DIFF_FILE};
use goinstr_engine::{GoGetResolver, InstrumentOptions, console};
use log::debug;

#[derive(Args, Debug, Clone)]
#[command(about = "Write a patch that adds New Relic instrumentation to a Go application")]
pub struct InstrumentArgs {
    /// Root directory of the application
    #[arg(short, long, value_name = "DIR", value_hint = clap::ValueHint::DirPath)]
    pub path: PathBuf,

    /// Application name reported to New Relic
    #[arg(short, long, default_value = "")]
    pub name: String,

    /// Variable the agent application is bound to in main
    #[arg(short, long, default_value = DEFAULT_AGENT_VARIABLE)]
    pub agent: String,

    /// File the patch is written to
    #[arg(long, value_name = "FILE", default_value = DEFAULT_DIFF_FILE)]
    pub diff: PathBuf,
}

pub fn execute(args: InstrumentArgs, debug: bool) -> Result<()> {
    if !args.path.is_dir() {
        bail!(
            "application path {} does not exist or is not a directory",
            args.path.display()
        );
    }
    if debug {
        console::enable();
    }
    debug!("instrumenting {} into {}", args.path.display(), args.diff.display());

    let options = InstrumentOptions {
        app_root: args.path.clone(),
        app_name: args.name,
        agent_variable: args.agent,
    };
    let file = File::create(&args.diff)
        .with_context(|| format!("Failed to create {}", args.diff.display()))?;
    let mut out = BufWriter::new(file);
    let result = goinstr_engine::instrument(&options, &GoGetResolver::default(), &mut out);
    console::flush(&mut std::io::stderr()).context("Failed to print advisories")?;
    let report = result.with_context(|| format!("Failed to instrument {}", args.path.display()))?;

    eprintln!(
        "{} {} ({} files changed, {} functions instrumented)",
        "Patch written to".green(),
        args.diff.display(),
        report.files_patched,
        report.instrumented.len()
    );
    Ok(())
}
