use crate::demo::{run_demo, run_explain, DemoArgs, ExplainArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use hr_policy::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "HR Field Policy",
    about = "Serve and inspect field-level capability policies from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Explain one field decision against a seed without starting the server
    Explain(ExplainArgs),
    /// Walk through the staffing scenarios using the bundled demo tenant
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// JSON seed to load into the registry (overrides POLICY_SEED_PATH)
    #[arg(long)]
    pub(crate) seed: Option<PathBuf>,
    /// Load the bundled demo tenant when no seed file is configured
    #[arg(long)]
    pub(crate) demo_seed: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Explain(args) => run_explain(args),
        Command::Demo(args) => run_demo(args),
    }
}
