//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "users_and_sessions",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                sender_id TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                preferred_language TEXT NOT NULL DEFAULT 'en',
                registration_status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS registration_sessions (
                sender_id TEXT PRIMARY KEY,
                step TEXT NOT NULL,
                language TEXT,
                name TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_updated ON registration_sessions(updated_at);
        "#,
    },
    Migration {
        version: 2,
        name: "nutrition_records",
        sql: r#"
            CREATE TABLE IF NOT EXISTS nutrition_records (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                image_url TEXT NOT NULL,
                storage_ref TEXT NOT NULL,
                raw_analysis TEXT NOT NULL,
                language TEXT,
                dish_name TEXT,
                cuisine_type TEXT,
                confidence_level TEXT,
                alternative_names TEXT NOT NULL DEFAULT '[]',
                serving_size TEXT,
                estimated_weight_grams REAL,
                portion_description TEXT,
                calories INTEGER,
                protein_g REAL,
                carbohydrates_g REAL,
                fat_g REAL,
                fiber_g REAL,
                sugar_g REAL,
                sodium_mg REAL,
                vitamins TEXT NOT NULL DEFAULT '[]',
                minerals TEXT NOT NULL DEFAULT '[]',
                health_score INTEGER,
                health_grade TEXT,
                nutrition_balance TEXT,
                health_benefits TEXT NOT NULL DEFAULT '[]',
                health_concerns TEXT NOT NULL DEFAULT '[]',
                overall_assessment TEXT,
                is_vegetarian INTEGER,
                is_vegan INTEGER,
                is_gluten_free INTEGER,
                is_dairy_free INTEGER,
                is_keto_friendly INTEGER,
                is_diabetic_friendly INTEGER,
                allergens TEXT NOT NULL DEFAULT '[]',
                healthier_alternatives TEXT NOT NULL DEFAULT '[]',
                portion_recommendations TEXT,
                cooking_tips TEXT NOT NULL DEFAULT '[]',
                nutritional_additions TEXT NOT NULL DEFAULT '[]',
                main_ingredients TEXT NOT NULL DEFAULT '[]',
                spices_and_seasonings TEXT NOT NULL DEFAULT '[]',
                cooking_method TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_records_user ON nutrition_records(user_id, created_at);
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::info!(version, "Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
