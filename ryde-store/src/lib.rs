pub mod app_config;
pub mod database;
pub mod booking_repo;
pub mod catalog_repo;
pub mod redis_repo;
pub mod events;
pub mod paystack;

pub use database::DbClient;
pub use booking_repo::PgBookingStore;
pub use catalog_repo::PgCatalogRepository;
pub use redis_repo::RedisClient;
pub use events::EventProducer;
pub use paystack::PaystackProvider;
