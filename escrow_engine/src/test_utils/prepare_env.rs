use log::*;

use crate::SqliteDatabase;

/// Loads `.env.test` (if present), initialises logging and returns a freshly migrated database at `url`.
pub async fn prepare_test_env(url: &str) -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    let db = SqliteDatabase::create_and_migrate(url, 5).await.expect("Error creating test database");
    info!("🚀️ Test database ready at {url}");
    db
}

/// A throw-away database file in the system temp directory.
pub fn random_db_path() -> String {
    let dir = std::env::temp_dir();
    format!("sqlite://{}/escrow_test_{}.db", dir.display(), rand::random::<u64>())
}
