use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod client;
mod extract;
mod setup;

use client::ApiClient;
use setup::SetupOptions;

const DEFAULT_URL: &str = "http://127.0.0.1:8000";

#[derive(Parser)]
#[command(name = "faceid", version, about = "Face ID verification CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify the two faces in a PDF against a running server
    Verify {
        /// PDF holding the document photo and the selfie
        file: PathBuf,
        #[arg(long, env = "FACEID_URL", default_value = DEFAULT_URL)]
        url: String,
    },
    /// Show server health
    Status {
        #[arg(long, env = "FACEID_URL", default_value = DEFAULT_URL)]
        url: String,
    },
    /// Show the loaded model pack
    ModelInfo {
        #[arg(long, env = "FACEID_URL", default_value = DEFAULT_URL)]
        url: String,
    },
    /// Write the page images of a PDF to a directory (no server needed)
    Extract {
        file: PathBuf,
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Prepare this machine to run faceidd
    Setup {
        /// Model directory (defaults to FACEID_MODEL_DIR or the per-user data dir)
        #[arg(long, env = "FACEID_MODEL_DIR")]
        model_dir: Option<PathBuf>,
        #[arg(long, env = "FACEID_MODEL_NAME", default_value = "buffalo_l")]
        model_name: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Verify { file, url } => {
            let pdf = std::fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "document.pdf".to_string());
            let body = ApiClient::new(&url).verify(&filename, pdf).await?;
            print_json(&body)?;
        }
        Commands::Status { url } => {
            print_json(&ApiClient::new(&url).status().await?)?;
        }
        Commands::ModelInfo { url } => {
            print_json(&ApiClient::new(&url).model_info().await?)?;
        }
        Commands::Extract { file, out } => {
            let pdf = std::fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let written = extract::extract_to_dir(&pdf, &out)?;
            if written.is_empty() {
                println!("No page images found in {}", file.display());
            }
            for path in written {
                println!("{}", path.display());
            }
        }
        Commands::Setup {
            model_dir,
            model_name,
            yes,
        } => {
            let opts = SetupOptions {
                model_dir: model_dir.unwrap_or_else(faceid_core::default_model_dir),
                model_name,
                config_file: std::env::var_os("FACEID_CONFIG").map(PathBuf::from),
                runtime_location: std::env::var("ORT_LIB_LOCATION")
                    .or_else(|_| std::env::var("ORT_DYLIB_PATH"))
                    .ok(),
                assume_yes: yes,
            };
            let stdin = std::io::stdin();
            let mut input = stdin.lock();
            let mut output = std::io::stdout();
            setup::run_setup(&opts, &mut input, &mut output)?;
        }
    }

    Ok(())
}
