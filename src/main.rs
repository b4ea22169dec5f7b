use interview_scheduler::{
    config::{get_config, init_config},
    database::pool::create_pool,
    routes, AppState,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = ?e, "failed to listen for shutdown signal");
    }
    info!("Shutdown requested");
    token.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    init_config()?;
    let config = get_config();

    let pool = create_pool(config).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let app_state = AppState::new(pool, config)?;
    let shutdown = CancellationToken::new();

    {
        let notif = app_state.notification_service.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let idle = match notif.run_once().await {
                    Ok(true) => Duration::ZERO,
                    Ok(false) => Duration::from_millis(1000),
                    Err(e) => {
                        tracing::error!(error = ?e, "Notification worker error");
                        Duration::from_secs(2)
                    }
                };
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(idle) => {}
                }
            }
        });
    }

    if let Some(calendar) = app_state.calendar.clone() {
        {
            let outbox = calendar.outbox_service.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let idle = match outbox.run_once().await {
                        Ok(true) => Duration::ZERO,
                        Ok(false) => Duration::from_millis(1000),
                        Err(e) => {
                            tracing::error!(error = ?e, "Calendar outbox worker error");
                            Duration::from_secs(2)
                        }
                    };
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(idle) => {}
                    }
                }
            });
        }

        if let Some(calendar_config) = &config.calendar {
            calendar
                .subscription_service
                .start_renewal(&calendar_config.subscription_renew_cron, shutdown.clone())
                .await?;
        }
    } else {
        info!("Calendar integration disabled; CALENDAR_CLIENT_ID is not set");
    }

    let app = routes::router(app_state);

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}
