use funding_engine::SqliteDatabase;
use log::*;

pub fn random_db_url() -> String {
    let path = std::env::temp_dir().join(format!("funding_test_{}.db", rand::random::<u64>()));
    format!("sqlite://{}?mode=rwc", path.display())
}

/// Creates a fresh, fully migrated test database.
pub async fn prepare_test_env() -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let url = random_db_url();
    let db = SqliteDatabase::new_with_url(&url, 1).await.expect("Error creating connection to test database");
    db.migrate().await.expect("Error running DB migrations");
    debug!("🚀️ Test database ready at {url}");
    db
}
