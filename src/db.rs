//! # Postgres
//!
//! Primary store for the catalog and user data.
//!
//! The pool is created lazily so the server can boot before the database is
//! reachable; the first query pays the connection cost.

use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::error::AppError;

pub fn init_pool(database_url: &str) -> Result<PgPool, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect_lazy(database_url)?;

    Ok(pool)
}
