use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use load_harness::config::{Cli, HarnessConfig};
use load_harness::model::LoadModel;
use load_harness::server::{run_server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = HarnessConfig::from(&cli);
    info!(variant = ?config.variant, pod_name = %config.pod_name, "loading model");

    // The listener is not bound until the model exists, so readiness probes
    // fail for the whole load.
    let model = LoadModel::load(&config).await?;
    let state = AppState::new(model, config.pod_name.as_str());

    run_server(config.addr, state, shutdown_signal()).await?;
    info!("load harness stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,load_harness=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
