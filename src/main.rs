use message_consumer::configuration::{ConfigurationError, Settings};
use message_consumer::startup::{
    Application, StartupError, BUILD_COMMIT, BUILD_NAME, BUILD_VERSION,
};
use message_consumer::telemetry::{init_subscriber, LogFormat};
use shutdown_handler::ShutdownHandler;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Instrument;

#[tokio::main]
async fn main() -> ExitCode {
    // Loaded first: `.env` may carry the log settings too.
    let settings = Settings::load();
    if let Err(e) = init_subscriber(LogFormat::from_env()) {
        eprintln!("Failed to install the log subscriber: {e}");
    }

    let span = tracing::info_span!(
        "service",
        build_name = BUILD_NAME,
        build_version = BUILD_VERSION
    );
    async move {
        match run(settings).await {
            Ok(()) => {
                tracing::info!("service stopped");
                ExitCode::SUCCESS
            }
            Err(e) => {
                let exit_code = e.exit_code();
                let error = anyhow::Error::from(e);
                tracing::error!(error = %format!("{error:#}"), exit_code, "service failed");
                ExitCode::from(exit_code)
            }
        }
    }
    .instrument(span)
    .await
}

async fn run(settings: Result<Settings, ConfigurationError>) -> Result<(), StartupError> {
    let settings = settings?;
    tracing::info!(build_commit = BUILD_COMMIT, settings = ?settings, "service started");

    let shutdown = shutdown_handler();
    let application = Application::build(&settings).await?;
    tracing::info!(address = %application.server_address(), "service ready");
    application.run_until_stopped(shutdown).await
}

/// Signalled on SIGTERM or Ctrl-C.
fn shutdown_handler() -> Arc<ShutdownHandler> {
    let shutdown = ShutdownHandler::sigterm().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to listen for SIGTERM");
        Arc::new(ShutdownHandler::new())
    });

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("received Ctrl-C");
                ctrl_c.shutdown();
            }
            Err(e) => tracing::warn!(error = %e, "failed to listen for Ctrl-C"),
        }
    });

    shutdown
}
