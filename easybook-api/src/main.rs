use anyhow::Context;
use chrono::FixedOffset;
use easybook_api::{
    app, seed,
    state::{AppState, AuthConfig, CatalogRules},
    worker,
};
use easybook_core::notify::{LogNotifier, Notifier};
use easybook_core::repository::{BookingRepository, ServiceRepository, UserRepository};
use easybook_core::user::DEFAULT_BCRYPT_COST;
use easybook_order::{
    BookingManager, BookingRules, MomoGateway, PaymentOrchestrator, PaypalGateway, ReminderSweep,
    VnpayGateway,
};
use easybook_store::app_config::Config;
use easybook_store::{DbClient, PgBookingRepository, PgServiceRepository, PgUserRepository, RedisClient, SmtpNotifier};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "easybook_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting EasyBook API on port {} ({})", config.server.port, config.server.environment);

    // Postgres
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let services: Arc<dyn ServiceRepository> = Arc::new(PgServiceRepository::new(db.pool.clone()));
    let bookings: Arc<dyn BookingRepository> = Arc::new(PgBookingRepository::new(db.pool.clone()));
    let users: Arc<dyn UserRepository> = Arc::new(PgUserRepository::new(db.pool.clone()));

    let rules = &config.business_rules;
    let offset = FixedOffset::east_opt(rules.slot_utc_offset_hours * 3600)
        .with_context(|| format!("Invalid UTC offset: {} hours", rules.slot_utc_offset_hours))?;

    // Email
    let notifier: Arc<dyn Notifier> = match config.smtp.host.as_deref() {
        Some(host) => Arc::new(SmtpNotifier::new(&config.smtp, host, offset).context("Failed to configure SMTP")?),
        None => {
            tracing::warn!("smtp.host is not set, emails will only be logged");
            Arc::new(LogNotifier)
        }
    };
    let send_timeout = Duration::from_secs(config.smtp.timeout_seconds);

    // Redis (optional)
    let redis = match config.redis.url.as_deref() {
        Some(url) => Some(Arc::new(RedisClient::new(url).context("Invalid Redis URL")?)),
        None => {
            tracing::warn!("redis.url is not set, rate limiting disabled");
            None
        }
    };

    let manager = BookingManager::new(
        services.clone(),
        bookings.clone(),
        notifier.clone(),
        BookingRules {
            cancellation_window: chrono::Duration::hours(rules.cancellation_window_hours),
            notify_timeout: send_timeout,
        },
    );
    let payments = PaymentOrchestrator::new(bookings.clone())
        .with_gateway(Arc::new(VnpayGateway::new(config.vnpay.clone())))
        .with_gateway(Arc::new(MomoGateway::new(config.momo.clone())))
        .with_gateway(Arc::new(PaypalGateway::new(config.paypal.clone())));

    seed::ensure_admin(users.as_ref(), &config.seed, DEFAULT_BCRYPT_COST)
        .await
        .context("Failed to seed admin account")?;

    if config.reminder.enabled {
        let sweep = Arc::new(ReminderSweep::new(
            services.clone(),
            bookings.clone(),
            users.clone(),
            notifier.clone(),
            send_timeout,
        ));
        tokio::spawn(worker::start_reminder_worker(
            sweep,
            Duration::from_secs(config.reminder.interval_seconds),
        ));
    }

    let app_state = AppState {
        services,
        bookings,
        users,
        manager: Arc::new(manager),
        payments: Arc::new(payments),
        redis,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
            password_cost: DEFAULT_BCRYPT_COST,
        },
        catalog: CatalogRules {
            utc_offset: offset,
            default_slot_days: rules.default_slot_days,
            default_slot_hours: rules.default_slot_hours.clone(),
        },
        frontend_url: config.server.frontend_url.clone(),
        environment: config.server.environment.clone(),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
