use anyhow::Context;
use runbox_agent::{AgentConfig, ProcessManager, format_error_chain, reconcile};
use runbox_control::{AppState, ServerConfig, routes, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;
    let _log_guard = telemetry::init_tracing(config.log_dir.as_deref());

    let agent_config = AgentConfig::from_env();
    tracing::info!(
        upload_dir = %agent_config.upload_dir.display(),
        process_dir = %agent_config.process_dir.display(),
        interpreter = %agent_config.interpreter,
        install = %agent_config.install_command_line(),
        base_port = agent_config.base_port,
        port_span = agent_config.port_span,
        "agent configured"
    );

    let manager = ProcessManager::new(agent_config).await?;
    if manager.config().reap_orphans {
        match reconcile::reap_orphans(manager.files(), manager.config().stop_grace).await {
            Ok(0) => {}
            Ok(reaped) => tracing::warn!(reaped, "terminated runs left over from a previous instance"),
            Err(e) => tracing::warn!(error = %format_error_chain(&e), "orphan reconciliation failed"),
        }
    }

    let addr = config.bind_addr()?;
    let state = AppState::new(manager.clone(), config);
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(%addr, "runbox-control HTTP listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped accepting connections, stopping runs");
    let stopped = manager.stop_all().await;
    tracing::info!(stopped = stopped.len(), "shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
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
    tracing::info!("shutdown signal received");
}
