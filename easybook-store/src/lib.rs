pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod mailer;
pub mod memory;
pub mod redis_repo;
pub mod service_repo;
pub mod user_repo;

pub use booking_repo::PgBookingRepository;
pub use database::DbClient;
pub use mailer::SmtpNotifier;
pub use memory::MemoryStore;
pub use redis_repo::RedisClient;
pub use service_repo::PgServiceRepository;
pub use user_repo::PgUserRepository;
