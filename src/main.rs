// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tessera_auth::{
    api::router,
    clock::SystemClock,
    config::{AuthConfig, LOG_FORMAT_ENV},
    geo::{GeoLocator, HttpGeoLocator, NoopGeoLocator},
    keys::{EnvSecretSource, KeyRotator, KeyStore},
    oauth2::ProviderRegistry,
    state::AppState,
    users::InMemoryUserStore,
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AuthConfig::from_env()?;
    let clock = SystemClock::shared();

    let keys = Arc::new(
        KeyStore::bootstrap(
            Arc::new(EnvSecretSource),
            config.key_store_config(),
            clock.clone(),
        )
        .await?,
    );
    let providers = ProviderRegistry::from_config(&config.oauth2.providers)?;
    let geo: Arc<dyn GeoLocator> = match &config.geolocation_url {
        Some(template) => Arc::new(HttpGeoLocator::new(template.clone())?),
        None => Arc::new(NoopGeoLocator),
    };

    let shutdown = CancellationToken::new();
    let rotator = KeyRotator::new(keys.clone(), clock.clone(), config.key_rotation_interval)
        .with_check_interval(config.key_rotation_check);
    let rotator_task = tokio::spawn(rotator.run(shutdown.clone()));

    let addr: SocketAddr = config.bind_addr().parse()?;
    let state = AppState::new(
        config,
        clock,
        keys,
        Arc::new(InMemoryUserStore::new()),
        providers,
        geo,
    );
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Tessera auth listening (docs at /docs)");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    shutdown.cancel();
    rotator_task.await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(e) = run().await {
        error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}
