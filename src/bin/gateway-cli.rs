use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

use dynamic_gateway::config::load_config;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the dynamic gateway", long_about = None)]
struct Cli {
    /// Base URL of the gateway's HTTP listener.
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the gateway answers
    Health,
    /// List cached backend connections and their states
    Connections,
    /// Load and validate a configuration file without starting the gateway
    Check {
        #[arg(default_value = "configs/config.json")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            let status = res.status();
            println!("{} {}", status.as_u16(), res.text().await?.trim());
        }
        Commands::Connections => {
            let res = client
                .get(format!("{}/health/connections", cli.url))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Check { config: path } => match load_config(&path) {
            Ok(config) => {
                println!(
                    "{}: ok ({} routes, {} services)",
                    path.display(),
                    config.http_routes.len(),
                    config.grpc_services.len()
                );
            }
            Err(e) => {
                eprintln!("Error: {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
