use clap::{Parser, Subcommand};
use colored::Colorize;
use env_logger::Env;

mod instrument;

#[derive(Parser)]
#[command(name = "goinstr")]
#[command(about = "Instrument Go applications with the New Relic Go agent", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging and print advisories after the run
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a patch that adds instrumentation to an application
    #[command(alias = "i")]
    Instrument(instrument::InstrumentArgs),
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {e:#}", "Error:".red());
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Default level depends on --debug, RUST_LOG overrides
    let env = if cli.debug {
        Env::default().default_filter_or("debug")
    } else {
        Env::default().default_filter_or("error")
    };
    env_logger::Builder::from_env(env).init();

    match cli.command {
        Commands::Instrument(args) => instrument::execute(args, cli.debug),
    }
}
