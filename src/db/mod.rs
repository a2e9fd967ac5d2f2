use std::time::Duration;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::errors::AppError;

pub mod memory;
pub mod row_parsers;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Clone)]
pub struct StoreConfig {
	/// Upper bound for a single lookup issued on behalf of a condition.
	pub lookup_timeout: Duration,
}

impl Default for StoreConfig {
	fn default() -> Self {
		Self {
			lookup_timeout: Duration::from_millis(DEFAULT_LOOKUP_TIMEOUT_MS),
		}
	}
}

impl StoreConfig {
	pub fn from_env() -> Result<Self, AppError> {
		let timeout_ms = std::env::var("AUTHZ_LOOKUP_TIMEOUT_MS")
			.map(|val| val.parse::<u64>())
			.unwrap_or(Ok(DEFAULT_LOOKUP_TIMEOUT_MS))
			.map_err(|_| AppError::configuration("AUTHZ_LOOKUP_TIMEOUT_MS must be a valid integer"))?;

		Ok(Self {
			lookup_timeout: Duration::from_millis(timeout_ms),
		})
	}
}

pub async fn init() -> anyhow::Result<SqlitePool> {
	let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;

	let options: SqliteConnectOptions = database_url
		.parse::<SqliteConnectOptions>()
		.context("invalid DATABASE_URL")?
		.create_if_missing(true)
		.foreign_keys(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(10)
		.min_connections(1)
		.acquire_timeout(Duration::from_secs(10))
		.connect_with(options)
		.await
		.context("failed to connect to database")?;

	sqlx::migrate!()
		.run(&pool)
		.await
		.context("failed to run migrations")?;

	Ok(pool)
}
