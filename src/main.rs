use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use axum_server::{Handle, tls_rustls::RustlsConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sparklenest_api::{
    build_app,
    config::AppConfig,
    db::{create_orm_conn, pool_of, run_migrations},
    middleware::rate_limit::RateLimiters,
    state::AppState,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);
const LIMITER_CLEANUP_EVERY: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sparklenest_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("a rustls crypto provider is already installed"))?;

    let config = AppConfig::from_env()?;
    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&pool_of(&orm)).await?;
    tracing::info!("database ready");

    let state = AppState::new(orm, config)?;
    if let Err(err) = state.security.prepare().await {
        tracing::warn!(error = %err, path = %state.security.path().display(), "security log directory unavailable");
    }
    if !state.mailer.is_configured() {
        tracing::warn!("EMAIL_USER/EMAIL_PASSWORD not set; OTP emails are only logged");
    }

    let limiters = RateLimiters::from_config(&state.config.rate_limits)?;
    limiters.spawn_cleanup(LIMITER_CLEANUP_EVERY);

    let config = state.config.clone();
    let app = build_app(state, &limiters);
    let ip: IpAddr = config.host.parse()?;

    let tls = match &config.tls {
        Some(tls) => match RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path).await {
            Ok(rustls) => Some(rustls),
            Err(err) => {
                tracing::error!(
                    error = %err,
                    cert = %tls.cert_path.display(),
                    key = %tls.key_path.display(),
                    "failed to load TLS certificate; falling back to HTTP"
                );
                None
            }
        },
        None => None,
    };

    match tls {
        Some(rustls) => {
            let https_addr = SocketAddr::new(ip, config.port);
            let http_addr = SocketAddr::new(ip, config.http_port);
            let https_handle = Handle::new();
            let http_handle = Handle::new();
            let (https_stop, http_stop) = (https_handle.clone(), http_handle.clone());
            tokio::spawn(async move {
                shutdown_signal().await;
                https_stop.graceful_shutdown(Some(SHUTDOWN_GRACE));
                http_stop.graceful_shutdown(Some(SHUTDOWN_GRACE));
            });

            tracing::info!("listening on https://{} and http://{}", https_addr, http_addr);
            let https = axum_server::bind_rustls(https_addr, rustls)
                .handle(https_handle)
                .serve(app.clone().into_make_service_with_connect_info::<SocketAddr>());
            let http = axum_server::bind(http_addr)
                .handle(http_handle)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>());
            tokio::try_join!(https, http)?;
        }
        None => {
            let port = if config.tls.is_some() {
                config.port.saturating_add(1)
            } else {
                config.port
            };
            let addr = SocketAddr::new(ip, port);
            let handle = Handle::new();
            let stop = handle.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                stop.graceful_shutdown(Some(SHUTDOWN_GRACE));
            });

            tracing::info!("listening on http://{}", addr);
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .await?;
        }
    }

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(err) => {
            tracing::error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}
