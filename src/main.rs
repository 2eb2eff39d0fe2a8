use std::{io, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use northsouth::{
    config::ConfigLoader,
    controller::SurveyController,
    dataset::DatasetLoader,
    results::ResultWriter,
    sampling::Granularity,
    terminal,
    web::{self, WebServerConfig},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "North-South divide preference revealer")]
struct Cli {
    /// Path to the survey YAML file
    #[arg(long, global = true, default_value = "surveys/great_britain.yaml")]
    config: PathBuf,

    /// Override the survey seed (random when neither is given)
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Answer the survey in this terminal
    Survey {
        #[arg(long, value_enum, default_value_t = Granularity::Coarse)]
        granularity: Granularity,

        /// Write the heatmap payload here when the survey completes
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Serve the survey over HTTP
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, default_value_t = 8080)]
        port: u16,

        /// Write the heatmap payload here whenever a survey completes
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let loader = ConfigLoader::new(".");
    let mut config = loader.load(&cli.config)?;
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    init_tracing(&config.logging.level);

    match cli.command {
        Command::Survey {
            granularity,
            output,
        } => {
            let dataset = DatasetLoader::new(&config.dataset)
                .load()
                .await
                .context("could not load the city dataset")?;
            let mut controller = SurveyController::new(Arc::new(dataset), config);
            let result = tokio::task::spawn_blocking(move || {
                let stdin = io::stdin();
                terminal::run_survey(&mut controller, granularity, stdin.lock(), io::stdout())
            })
            .await??;

            match (result, output) {
                (Some(result), Some(path)) => {
                    let path = ResultWriter::new(path).write(&result)?;
                    println!("Heatmap payload written to {}", path.display());
                }
                (Some(result), None) => {
                    println!("{}", serde_json::to_string(&result.points)?);
                }
                (None, _) => println!("Survey abandoned."),
            }
        }
        Command::Serve { host, port, output } => {
            web::run(WebServerConfig {
                survey: config,
                output,
                host,
                port,
            })
            .await?;
        }
    }
    Ok(())
}
