use std::str::FromStr;

use sqlx::{migrate::Migrator, sqlite::SqliteConnectOptions, Sqlite, SqlitePool, Transaction};

use crate::{errors::AppError, log_and_wrap_custom_internal};

#[derive(Clone, Debug)]
pub struct Database {
    storage: SqlitePool,
}

impl Database {
    pub fn new(url: &str) -> Self {
        let database_config = SqliteConnectOptions::from_str(url)
            .expect("Cannot connect to database")
            .create_if_missing(true);

        Self {
            storage: SqlitePool::connect_lazy_with(database_config),
        }
    }

    pub async fn run_migrations(&self) {
        Migrator::new(std::path::Path::new("./migrations/principal"))
            .await
            .expect("Where are the migrations?")
            .run(&self.storage)
            .await
            .expect("Migrations failed");
    }

    pub fn get_connection(&self) -> &SqlitePool {
        &self.storage
    }

    pub async fn start_transaction(&self) -> Result<Transaction<'static, Sqlite>, AppError> {
        self.storage
            .begin()
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))
    }
}
