/// Score repository: append-only analysis results plus document metadata, in SQLite.
///
/// rusqlite is synchronous, so every query runs on the blocking pool against a single
/// mutex-guarded connection. The connection is opened once at startup and migrated there.
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::model::{AnalysisResult, Category, CategoryScores, DocumentRef};

/// Upper bound on bound parameters per batch query.
const BATCH_QUERY_LIMIT: usize = 500;

const RESULT_COLUMNS: &str = "id, startup_id, founder_id, document_id, startup_score, \
     usp_score, market_score, business_model_score, team_score, finance_score, created_at";

#[derive(Clone)]
pub struct ScoreRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ScoreRepository {
    /// Open (or create) the database file and run pending migrations.
    pub fn open(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::Storage(format!("create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, AppError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, AppError> {
        configure_pragmas(&conn)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, AppError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| AppError::Storage("database connection poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| AppError::Storage(format!("database task failed: {e}")))?
    }

    pub async fn record_document(&self, doc: &DocumentRef) -> Result<(), AppError> {
        let doc = doc.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO documents (id, owner_id, path, format, original_name, size_bytes, sha256, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    doc.id.to_string(),
                    doc.owner_id.to_string(),
                    doc.path.to_string_lossy(),
                    doc.format.as_str(),
                    doc.original_name,
                    doc.size_bytes as i64,
                    doc.sha256,
                    doc.created_at.timestamp_micros(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Append a result and return its id. Existing results are never modified.
    pub async fn save(&self, result: &AnalysisResult) -> Result<Uuid, AppError> {
        let result = result.clone();
        self.with_conn(move |conn| {
            let scores = &result.category_scores;
            conn.execute(
                "INSERT INTO analysis_results (id, startup_id, founder_id, document_id, startup_score,
                     usp_score, market_score, business_model_score, team_score, finance_score, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    result.id.to_string(),
                    result.startup_id.to_string(),
                    result.founder_id.to_string(),
                    result.document_id.to_string(),
                    result.total_score,
                    scores.get(Category::Usp),
                    scores.get(Category::Market),
                    scores.get(Category::BusinessModel),
                    scores.get(Category::Team),
                    scores.get(Category::Finance),
                    result.created_at.timestamp_micros(),
                ],
            )?;
            info!(analysis_id = %result.id, startup_id = %result.startup_id, "analysis result saved");
            Ok(result.id)
        })
        .await
    }

    /// Most recent result for a startup. Equal timestamps resolve to the later insert.
    pub async fn latest_for(&self, startup_id: Uuid) -> Result<Option<AnalysisResult>, AppError> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {RESULT_COLUMNS} FROM analysis_results
                 WHERE startup_id = ?1
                 ORDER BY created_at DESC, seq DESC
                 LIMIT 1"
            );
            let result = conn
                .query_row(&sql, params![startup_id.to_string()], result_from_row)
                .optional()?;
            Ok(result)
        })
        .await
    }

    /// Most recent result for each of `startup_ids`, in one query per batch.
    ///
    /// Startups without results are absent from the map. Duplicate ids are harmless.
    pub async fn latest_for_many(
        &self,
        startup_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, AnalysisResult>, AppError> {
        let mut seen = HashSet::new();
        let ids: Vec<String> = startup_ids
            .iter()
            .filter(|id| seen.insert(**id))
            .map(Uuid::to_string)
            .collect();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        self.with_conn(move |conn| {
            let mut latest = HashMap::new();
            for batch in ids.chunks(BATCH_QUERY_LIMIT) {
                let placeholders = vec!["?"; batch.len()].join(", ");
                let sql = format!(
                    "SELECT {RESULT_COLUMNS} FROM (
                         SELECT *, ROW_NUMBER() OVER (
                             PARTITION BY startup_id ORDER BY created_at DESC, seq DESC
                         ) AS rn
                         FROM analysis_results
                         WHERE startup_id IN ({placeholders})
                     ) WHERE rn = 1"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(batch.iter()), result_from_row)?;
                for row in rows {
                    let result = row?;
                    latest.insert(result.startup_id, result);
                }
            }
            debug!(requested = ids.len(), found = latest.len(), "batch latest lookup");
            Ok(latest)
        })
        .await
    }

    /// The startup owned by `founder_id`. A founder with several startups resolves to the
    /// first one registered.
    pub async fn startup_for_founder(&self, founder_id: Uuid) -> Result<Option<Uuid>, AppError> {
        self.with_conn(move |conn| {
            let id: Option<String> = conn
                .query_row(
                    "SELECT id FROM startups WHERE founder_id = ?1 ORDER BY rowid LIMIT 1",
                    params![founder_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            id.map(|raw| {
                Uuid::parse_str(&raw)
                    .map_err(|e| AppError::Storage(format!("malformed startup id '{raw}': {e}")))
            })
            .transpose()
        })
        .await
    }
}

fn configure_pragmas(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "PRAGMA foreign_keys=ON;
         PRAGMA busy_timeout=5000;",
    )?;
    Ok(())
}

fn run_migrations(conn: &Connection) -> Result<(), AppError> {
    let current_version = current_schema_version(conn);

    let migrations: Vec<(i64, &str)> = vec![(1, include_str!("../migrations/001_initial.sql"))];

    for (version, sql) in migrations {
        if version > current_version {
            info!("Running migration v{version}");
            conn.execute_batch(sql).map_err(|e| {
                AppError::Storage(format!("migration v{version} failed: {e}"))
            })?;
        }
    }
    Ok(())
}

/// Current schema version (0 if no schema exists yet).
fn current_schema_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })
    .unwrap_or(0)
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    DateTime::from_timestamp_micros(micros).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, micros))
}

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<AnalysisResult> {
    let category_scores: CategoryScores = [
        (Category::Usp, row.get::<_, f64>(5)?),
        (Category::Market, row.get(6)?),
        (Category::BusinessModel, row.get(7)?),
        (Category::Team, row.get(8)?),
        (Category::Finance, row.get(9)?),
    ]
    .into_iter()
    .collect();

    Ok(AnalysisResult {
        id: uuid_column(row, 0)?,
        startup_id: uuid_column(row, 1)?,
        founder_id: uuid_column(row, 2)?,
        document_id: uuid_column(row, 3)?,
        total_score: row.get(4)?,
        category_scores,
        created_at: timestamp_column(row, 10)?,
    })
}
