//! Application service operator.

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod config;
mod crd;
mod run;

#[derive(Parser)]
#[command(name = "has-operator")]
#[command(about = "Reconciles Applications, Components and ComponentDetectionQueries", long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, env = "HAS_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the operator against the current cluster
    Run(config::RunArgs),
    /// Print the custom resource definitions as YAML
    Crd,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            init_tracing(cli.log_format);
            run::run(args.into_config()).await
        }
        Commands::Crd => {
            print!("{}", crd::render()?);
            Ok(())
        }
    }
}
