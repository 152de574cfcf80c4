//! Floralog Server - REST API for the plant-observation pipeline
//!
//! Serves the gallery endpoints, accepts observation submissions, and
//! relays identification requests to the external provider with the
//! credential held server-side.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use floralog_server::{create_router_with_config, Config};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("╔════════════════════════════════════════════╗");
    println!("║       FLORALOG API Server v{}           ║", env!("CARGO_PKG_VERSION"));
    println!("║        Plant Observation Cataloguing       ║");
    println!("╚════════════════════════════════════════════╝");

    let config = Config::from_env();
    let addr = config.socket_addr();
    let app = create_router_with_config(&config);

    println!("\nListening on http://{}", addr);
    println!("\nEndpoints:");
    println!("  GET  /photos        - List observations (images resolved)");
    println!("  GET  /metadata      - List raw metadata records");
    println!("  GET  /photo?hash=   - Fetch one photo by content hash");
    println!("  POST /observations  - Submit an observation (JSON, inline image)");
    println!("  POST /identify      - Species identification relay (multipart)");
    println!("  GET  /health        - Health check");
    println!("  GET  /swagger-ui    - API documentation");
    println!("\nExample:");
    println!("  curl http://{}/photos", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "cannot bind listener");
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server exited with error");
        std::process::exit(1);
    }
}

/// Resolve on ctrl-c so in-flight requests drain before exit.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot install ctrl-c handler");
        return;
    }
    tracing::info!("shutdown signal received");
}
