use std::path::PathBuf;

use log::info;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::sqlite::SqliteDatabase;

/// A unique sqlite url under the system temp dir, so parallel tests never share a database file.
pub fn random_db_path() -> String {
    let path = PathBuf::from(std::env::temp_dir()).join(format!("beanpay_test_{:016x}.db", rand::random::<u64>()));
    format!("sqlite://{}", path.display())
}

pub async fn prepare_test_env(url: &str) -> SqliteDatabase {
    let _ = dotenvy::from_filename(".env.test");
    let _ = env_logger::try_init();
    create_database(url).await;
    run_migrations(url).await
}

pub async fn create_database(url: &str) {
    if Sqlite::database_exists(url).await.unwrap_or(false) {
        Sqlite::drop_database(url).await.expect("Error dropping stale test database");
    }
    Sqlite::create_database(url).await.expect("Error creating test database");
    info!("🚀️ Created test database at {url}");
}

pub async fn run_migrations(url: &str) -> SqliteDatabase {
    // A single connection, so reads are serialized behind writes: with more connections a read can
    // land on a fresh connection before the previous write's implicit commit has finished on its
    // worker thread, and miss the row.
    let db = SqliteDatabase::new_with_url(url, 1).await.expect("Error connecting to the test database");
    db.migrate().await.expect("Error running migrations");
    db
}
