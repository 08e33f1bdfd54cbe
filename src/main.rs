pub mod config;
pub mod data;
pub mod layers;
pub mod map;
pub mod render;
pub mod scale;
pub mod server;
pub mod types;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the map to a self-contained HTML page
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long, value_name = "FILE", default_value = "map.html")]
        out: PathBuf,
    },
    /// Serve the map and its embed API
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Render { config, out } => {
            info!("Rendering map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            // 1. Load and join the sources
            let dataset = data::load_data(&app_config)?;

            // 2. Assemble layers, markers, and tables
            let document = map::assemble(&app_config, &dataset)?;

            // 3. Write the page
            render::write_html(&document, out)?;
            info!("Render complete");
        }
        Commands::Serve { config } => {
            info!("Serving map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            let dataset = data::load_data(&app_config)?;
            let document = map::assemble(&app_config, &dataset)?;

            server::start_server(app_config, document, dataset.regions).await?;
        }
    }

    Ok(())
}
