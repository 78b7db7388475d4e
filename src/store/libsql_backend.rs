//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Value, params};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::nutrition::record::{
    DietaryInfo, DishIdentity, HealthAnalysis, Improvements, IngredientBreakdown, NutritionFacts,
    ServingInfo,
};
use crate::nutrition::{ImageRef, NormalizedAnalysis, NutritionRecord};
use crate::registration::{
    RegistrationSession, RegistrationStatus, RegistrationStep, User,
};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations. Writes
/// are serialized through `write_lock` so a transaction on the shared
/// connection never absorbs another task's statements.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    write_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format: RFC 3339, microseconds, `Z` suffix. Fixed width
/// keeps string comparison in SQL consistent with time order.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> Value {
    match s {
        Some(s) => Value::Text(s.to_string()),
        None => Value::Null,
    }
}

fn opt_real(v: Option<f64>) -> Value {
    v.map(Value::Real).unwrap_or(Value::Null)
}

fn opt_int(v: Option<i64>) -> Value {
    v.map(Value::Integer).unwrap_or(Value::Null)
}

fn opt_flag(v: Option<bool>) -> Value {
    v.map(|b| Value::Integer(i64::from(b))).unwrap_or(Value::Null)
}

fn json_list(items: &[String]) -> Result<Value, DatabaseError> {
    serde_json::to_string(items)
        .map(Value::Text)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn row_text(row: &libsql::Row, idx: i32) -> Option<String> {
    row.get::<String>(idx).ok()
}

fn row_real(row: &libsql::Row, idx: i32) -> Option<f64> {
    row.get::<f64>(idx).ok()
}

fn row_int(row: &libsql::Row, idx: i32) -> Option<i64> {
    row.get::<i64>(idx).ok()
}

fn row_flag(row: &libsql::Row, idx: i32) -> Option<bool> {
    row_int(row, idx).map(|v| v != 0)
}

fn row_list(row: &libsql::Row, idx: i32) -> Vec<String> {
    row_text(row, idx)
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

const USER_COLUMNS: &str =
    "id, sender_id, name, preferred_language, registration_status, created_at, updated_at";

const SESSION_COLUMNS: &str = "sender_id, step, language, name, created_at, updated_at";

/// Column order matches `row_to_record` and `record_values`.
const RECORD_COLUMNS: &str = "id, user_id, image_url, storage_ref, raw_analysis, language, \
    dish_name, cuisine_type, confidence_level, alternative_names, \
    serving_size, estimated_weight_grams, portion_description, \
    calories, protein_g, carbohydrates_g, fat_g, fiber_g, sugar_g, sodium_mg, vitamins, minerals, \
    health_score, health_grade, nutrition_balance, health_benefits, health_concerns, overall_assessment, \
    is_vegetarian, is_vegan, is_gluten_free, is_dairy_free, is_keto_friendly, is_diabetic_friendly, allergens, \
    healthier_alternatives, portion_recommendations, cooking_tips, nutritional_additions, \
    main_ingredients, spices_and_seasonings, cooking_method, created_at";

const RECORD_COLUMN_COUNT: usize = 43;

/// Map a libsql Row to a User.
fn row_to_user(row: &libsql::Row) -> Result<User, libsql::Error> {
    let id_str: String = row.get(0)?;
    let status_str: String = row.get(4)?;
    let created_str: String = row.get(5)?;
    let updated_str: String = row.get(6)?;

    Ok(User {
        id: parse_uuid(&id_str),
        sender_id: row.get(1)?,
        name: row.get(2)?,
        preferred_language: row.get(3)?,
        registration_status: RegistrationStatus::parse(&status_str),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Map a libsql Row to a RegistrationSession.
fn row_to_session(row: &libsql::Row) -> Result<RegistrationSession, libsql::Error> {
    let step_str: String = row.get(1)?;
    let created_str: String = row.get(4)?;
    let updated_str: String = row.get(5)?;

    Ok(RegistrationSession {
        sender_id: row.get(0)?,
        step: RegistrationStep::parse(&step_str),
        language: row_text(row, 2),
        name: row_text(row, 3),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn record_values(record: &NutritionRecord) -> Result<Vec<Value>, DatabaseError> {
    let a = &record.analysis;
    Ok(vec![
        Value::Text(record.id.to_string()),
        Value::Text(record.user_id.to_string()),
        Value::Text(record.image.public_url.clone()),
        Value::Text(record.image.storage_ref.clone()),
        Value::Text(record.raw_analysis.clone()),
        opt_text(a.language.as_deref()),
        opt_text(a.dish.dish_name.as_deref()),
        opt_text(a.dish.cuisine_type.as_deref()),
        opt_text(a.dish.confidence_level.as_deref()),
        json_list(&a.dish.alternative_names)?,
        opt_text(a.serving.serving_size.as_deref()),
        opt_real(a.serving.estimated_weight_grams),
        opt_text(a.serving.portion_description.as_deref()),
        opt_int(a.nutrition.calories),
        opt_real(a.nutrition.protein_g),
        opt_real(a.nutrition.carbohydrates_g),
        opt_real(a.nutrition.fat_g),
        opt_real(a.nutrition.fiber_g),
        opt_real(a.nutrition.sugar_g),
        opt_real(a.nutrition.sodium_mg),
        json_list(&a.nutrition.vitamins)?,
        json_list(&a.nutrition.minerals)?,
        opt_int(a.health.health_score),
        opt_text(a.health.health_grade.as_deref()),
        opt_text(a.health.nutrition_balance.as_deref()),
        json_list(&a.health.health_benefits)?,
        json_list(&a.health.health_concerns)?,
        opt_text(a.health.overall_assessment.as_deref()),
        opt_flag(a.dietary.is_vegetarian),
        opt_flag(a.dietary.is_vegan),
        opt_flag(a.dietary.is_gluten_free),
        opt_flag(a.dietary.is_dairy_free),
        opt_flag(a.dietary.is_keto_friendly),
        opt_flag(a.dietary.is_diabetic_friendly),
        json_list(&a.dietary.allergens)?,
        json_list(&a.improvements.healthier_alternatives)?,
        opt_text(a.improvements.portion_recommendations.as_deref()),
        json_list(&a.improvements.cooking_tips)?,
        json_list(&a.improvements.nutritional_additions)?,
        json_list(&a.ingredients.main_ingredients)?,
        json_list(&a.ingredients.spices_and_seasonings)?,
        opt_text(a.ingredients.cooking_method.as_deref()),
        Value::Text(ts(record.created_at)),
    ])
}

/// Map a libsql Row to a NutritionRecord. Column order matches RECORD_COLUMNS.
fn row_to_record(row: &libsql::Row) -> Result<NutritionRecord, libsql::Error> {
    let id_str: String = row.get(0)?;
    let user_str: String = row.get(1)?;
    let created_str: String = row.get(42)?;

    let analysis = NormalizedAnalysis {
        language: row_text(row, 5),
        dish: DishIdentity {
            dish_name: row_text(row, 6),
            cuisine_type: row_text(row, 7),
            confidence_level: row_text(row, 8),
            alternative_names: row_list(row, 9),
        },
        serving: ServingInfo {
            serving_size: row_text(row, 10),
            estimated_weight_grams: row_real(row, 11),
            portion_description: row_text(row, 12),
        },
        nutrition: NutritionFacts {
            calories: row_int(row, 13),
            protein_g: row_real(row, 14),
            carbohydrates_g: row_real(row, 15),
            fat_g: row_real(row, 16),
            fiber_g: row_real(row, 17),
            sugar_g: row_real(row, 18),
            sodium_mg: row_real(row, 19),
            vitamins: row_list(row, 20),
            minerals: row_list(row, 21),
        },
        health: HealthAnalysis {
            health_score: row_int(row, 22),
            health_grade: row_text(row, 23),
            nutrition_balance: row_text(row, 24),
            health_benefits: row_list(row, 25),
            health_concerns: row_list(row, 26),
            overall_assessment: row_text(row, 27),
        },
        dietary: DietaryInfo {
            is_vegetarian: row_flag(row, 28),
            is_vegan: row_flag(row, 29),
            is_gluten_free: row_flag(row, 30),
            is_dairy_free: row_flag(row, 31),
            is_keto_friendly: row_flag(row, 32),
            is_diabetic_friendly: row_flag(row, 33),
            allergens: row_list(row, 34),
        },
        improvements: Improvements {
            healthier_alternatives: row_list(row, 35),
            portion_recommendations: row_text(row, 36),
            cooking_tips: row_list(row, 37),
            nutritional_additions: row_list(row, 38),
        },
        ingredients: IngredientBreakdown {
            main_ingredients: row_list(row, 39),
            spices_and_seasonings: row_list(row, 40),
            cooking_method: row_text(row, 41),
        },
    };

    Ok(NutritionRecord {
        id: parse_uuid(&id_str),
        user_id: parse_uuid(&user_str),
        image: ImageRef {
            public_url: row.get(2)?,
            storage_ref: row.get(3)?,
        },
        raw_analysis: row.get(4)?,
        analysis,
        created_at: parse_datetime(&created_str),
    })
}

/// Classify an insert failure: UNIQUE violations become `Constraint`.
fn insert_error(context: &str, e: libsql::Error) -> DatabaseError {
    let message = e.to_string();
    if message.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("{context}: {message}"))
    } else {
        DatabaseError::Query(format!("{context}: {message}"))
    }
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn get_user(&self, sender_id: &str) -> Result<Option<User>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE sender_id = ?1"),
                params![sender_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row_to_user(&row).map_err(|e| DatabaseError::Query(format!("get_user row: {e}")))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_user: {e}"))),
        }
    }

    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    user.id.to_string(),
                    user.sender_id.as_str(),
                    user.name.as_str(),
                    user.preferred_language.as_str(),
                    user.registration_status.as_str(),
                    ts(user.created_at),
                    ts(user.updated_at),
                ],
            )
            .await
            .map_err(|e| insert_error("insert_user", e))?;
        debug!(sender = %user.sender_id, "User created");
        Ok(())
    }

    async fn complete_registration(
        &self,
        sender_id: &str,
        name: &str,
        language: &str,
    ) -> Result<Uuid, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("complete_registration begin: {e}")))?;

        let result: Result<Uuid, DatabaseError> = async {
            let now = ts(Utc::now());
            tx.execute(
                "INSERT INTO users (id, sender_id, name, preferred_language, registration_status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 'completed', ?5, ?5)
                 ON CONFLICT (sender_id) DO UPDATE SET
                    name = excluded.name,
                    preferred_language = excluded.preferred_language,
                    registration_status = 'completed',
                    updated_at = excluded.updated_at",
                params![Uuid::new_v4().to_string(), sender_id, name, language, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("complete_registration upsert: {e}")))?;

            let mut rows = tx
                .query("SELECT id FROM users WHERE sender_id = ?1", params![sender_id])
                .await
                .map_err(|e| DatabaseError::Query(format!("complete_registration select: {e}")))?;
            let id_str: String = match rows.next().await {
                Ok(Some(row)) => row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("complete_registration id: {e}")))?,
                Ok(None) => {
                    return Err(DatabaseError::NotFound {
                        entity: "user".into(),
                        id: sender_id.to_string(),
                    });
                }
                Err(e) => return Err(DatabaseError::Query(format!("complete_registration: {e}"))),
            };
            drop(rows);

            tx.execute(
                "DELETE FROM registration_sessions WHERE sender_id = ?1",
                params![sender_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("complete_registration delete: {e}")))?;

            Ok(parse_uuid(&id_str))
        }
        .await;

        match result {
            Ok(id) => {
                tx.commit()
                    .await
                    .map_err(|e| DatabaseError::Query(format!("complete_registration commit: {e}")))?;
                debug!(sender = %sender_id, user_id = %id, "Registration committed");
                Ok(id)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "complete_registration rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn update_user_language(
        &self,
        sender_id: &str,
        language: &str,
    ) -> Result<bool, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let count = self
            .conn()
            .execute(
                "UPDATE users SET preferred_language = ?2, updated_at = ?3 WHERE sender_id = ?1",
                params![sender_id, language, ts(Utc::now())],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_user_language: {e}")))?;
        Ok(count > 0)
    }

    // ── Registration sessions ───────────────────────────────────────

    async fn get_session(
        &self,
        sender_id: &str,
    ) -> Result<Option<RegistrationSession>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM registration_sessions WHERE sender_id = ?1"),
                params![sender_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row_to_session(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_session row: {e}")))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_session: {e}"))),
        }
    }

    async fn save_session(&self, session: &RegistrationSession) -> Result<bool, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let count = self
            .conn()
            .execute(
                &format!(
                    "INSERT INTO registration_sessions ({SESSION_COLUMNS})
                     SELECT ?1, ?2, ?3, ?4, ?5, ?6
                     WHERE NOT EXISTS (
                        SELECT 1 FROM users WHERE sender_id = ?1 AND registration_status = ?7
                     )
                     ON CONFLICT (sender_id) DO UPDATE SET
                        step = excluded.step, language = excluded.language,
                        name = excluded.name, updated_at = excluded.updated_at"
                ),
                vec![
                    Value::Text(session.sender_id.clone()),
                    Value::Text(session.step.as_str().to_string()),
                    opt_text(session.language.as_deref()),
                    opt_text(session.name.as_deref()),
                    Value::Text(ts(session.created_at)),
                    Value::Text(ts(session.updated_at)),
                    Value::Text(RegistrationStatus::Completed.as_str().to_string()),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_session: {e}")))?;
        if count == 0 {
            debug!(sender = %session.sender_id, "Session not saved; sender already registered");
            return Ok(false);
        }
        debug!(sender = %session.sender_id, step = %session.step, "Session saved");
        Ok(true)
    }

    async fn update_session(&self, session: &RegistrationSession) -> Result<bool, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let count = self
            .conn()
            .execute(
                "UPDATE registration_sessions
                 SET step = ?2, language = ?3, name = ?4, updated_at = ?5
                 WHERE sender_id = ?1",
                vec![
                    Value::Text(session.sender_id.clone()),
                    Value::Text(session.step.as_str().to_string()),
                    opt_text(session.language.as_deref()),
                    opt_text(session.name.as_deref()),
                    Value::Text(ts(session.updated_at)),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_session: {e}")))?;
        Ok(count > 0)
    }

    async fn delete_session(&self, sender_id: &str) -> Result<bool, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let count = self
            .conn()
            .execute(
                "DELETE FROM registration_sessions WHERE sender_id = ?1",
                params![sender_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_session: {e}")))?;
        Ok(count > 0)
    }

    async fn purge_sessions_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DatabaseError> {
        let _guard = self.write_lock.lock().await;
        let count = self
            .conn()
            .execute(
                "DELETE FROM registration_sessions WHERE updated_at < ?1",
                params![ts(cutoff)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("purge_sessions_before: {e}")))?;
        Ok(count as usize)
    }

    // ── Nutrition records ───────────────────────────────────────────

    async fn insert_nutrition_record(&self, record: &NutritionRecord) -> Result<(), DatabaseError> {
        let values = record_values(record)?;
        let placeholders = (1..=RECORD_COLUMN_COUNT)
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");

        let _guard = self.write_lock.lock().await;
        self.conn()
            .execute(
                &format!("INSERT INTO nutrition_records ({RECORD_COLUMNS}) VALUES ({placeholders})"),
                values,
            )
            .await
            .map_err(|e| insert_error("insert_nutrition_record", e))?;
        debug!(id = %record.id, user_id = %record.user_id, "Nutrition record stored");
        Ok(())
    }

    async fn list_nutrition_records(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<NutritionRecord>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM nutrition_records
                     WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2"
                ),
                params![user_id.to_string(), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_nutrition_records: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_nutrition_records: {e}")))?
        {
            records.push(
                row_to_record(&row)
                    .map_err(|e| DatabaseError::Query(format!("list_nutrition_records row: {e}")))?,
            );
        }
        Ok(records)
    }
}
