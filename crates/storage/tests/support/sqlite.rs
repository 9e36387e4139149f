use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use sqlx::migrate::Migrator;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations_sqlite");
static COUNTER: AtomicU64 = AtomicU64::new(1);

pub struct SqliteTestDb {
    pub pool: SqlitePool,
    pub db_path: PathBuf,
    keep_db: bool,
}

impl Drop for SqliteTestDb {
    fn drop(&mut self) {
        if self.keep_db {
            return;
        }

        let _ = std::fs::remove_file(&self.db_path);
    }
}

pub async fn setup_test_db() -> Result<SqliteTestDb, sqlx::Error> {
    let keep_db = std::env::var("TEST_KEEP_DB").ok().as_deref() == Some("1");
    let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
    let db_path = std::env::temp_dir().join(format!(
        "platform-storage-sqlite-test-{}-{}.db",
        std::process::id(),
        unique
    ));

    if db_path.exists() {
        let _ = std::fs::remove_file(&db_path);
    }

    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;

    Ok(SqliteTestDb {
        pool,
        db_path,
        keep_db,
    })
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Protocol(format!("sqlite migration failed: {e}")))
}

/// Fixture ids seeded by [`seed_common_fixtures`], fixed so tests can
/// reference them without round-tripping through a prior insert.
pub const FIXTURE_PLAN_ID: &str = "11111111-1111-1111-1111-111111111111";
pub const FIXTURE_MODULE_ID: &str = "22222222-2222-2222-2222-222222222222";
pub const FIXTURE_TOPIC_ID: &str = "33333333-3333-3333-3333-333333333333";
pub const FIXTURE_AUTHOR_ID: &str = "44444444-4444-4444-4444-444444444444";

pub async fn seed_common_fixtures(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO study_plans (id, author_id, title, status) VALUES (?1, ?2, ?3, 'active')")
        .bind(FIXTURE_PLAN_ID)
        .bind(FIXTURE_AUTHOR_ID)
        .bind("Fixture Plan")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"INSERT INTO modules (id, plan_id, "order", title) VALUES (?1, ?2, 0, ?3)"#,
    )
    .bind(FIXTURE_MODULE_ID)
    .bind(FIXTURE_PLAN_ID)
    .bind("Fixture Module")
    .execute(pool)
    .await?;

    sqlx::query(
        r#"INSERT INTO topics (id, module_id, "order", name, theory, published) VALUES (?1, ?2, 0, ?3, ?4, 1)"#,
    )
    .bind(FIXTURE_TOPIC_ID)
    .bind(FIXTURE_MODULE_ID)
    .bind("Fixture Topic")
    .bind("some theory text")
    .execute(pool)
    .await?;

    Ok(())
}
