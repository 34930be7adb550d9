use clap::Parser;
use plotgrid_engine::PlotConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "plotgrid-server", about = "Plot-world adapter API for a voxel game host")]
struct Args {
    /// YAML config; missing file means defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "127.0.0.1:39340")]
    listen: SocketAddr,
}

fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".plotgrid")
        .join("plotgrid.yaml")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(default_config_path);
    let config = PlotConfig::load(&config_path)?;
    tracing::info!(
        config = %config_path.display(),
        db = %config.database.path.display(),
        world = %config.world_name,
        "starting plotgrid"
    );

    let state = plotgrid_server::AppState::from_config(&config)?;
    plotgrid_server::serve(args.listen, state).await
}
