use clap::Parser;

use students_graphql::models::STUDENTS;
use students_graphql::{build_schema, http, store, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = Config::parse();

    let provider = store::open(&config, &[STUDENTS]).await?;
    let schema = build_schema(provider.clone());
    let app = http::router(schema, provider.clone(), http::cors_layer(&config.cors_origins)?);

    log::info!(
        "Starting students GraphQL server on http://{}{}",
        config.bind,
        http::GRAPHQL_PATH
    );
    axum::Server::bind(&config.bind)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    provider.close().await;
    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                log::error!("Failed to listen for SIGTERM: {}", err);
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
    log::info!("Shutdown signal received, draining connections");
}
