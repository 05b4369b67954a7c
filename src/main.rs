use clap::Parser;
use link_preview::{setup_logging, validate_config, Cli, CliRunner, Commands};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Cli::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    info!("Starting link-preview v{}", env!("CARGO_PKG_VERSION"));

    // Validation needs no workers
    let result = match args.command.clone().unwrap_or(Commands::Serve) {
        Commands::Validate { file } => return validate_config(file),
        Commands::Serve => runner(&args)?.run_server(shutdown_signal()).await,
        Commands::Preview { url } => runner(&args)?.run_preview(url).await,
    };

    if let Err(e) = result {
        error!("Application error: {}", e);
        std::process::exit(1);
    }

    // Workers are not drained; in-flight jobs end with the process.
    info!("link-preview stopped");
    Ok(())
}

fn runner(args: &Cli) -> anyhow::Result<CliRunner> {
    CliRunner::new(args.load_config()?)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
