// ==========================================
// 商品目录导入引擎 - 导入作业 Repository 实现
// ==========================================
// 职责: 实现 ImportJobRepository（使用 rusqlite）
// 存储: 标量列 + JSON 列（mapping/errors/warnings/results）
// ==========================================

use crate::db::{ensure_schema, open_sqlite_connection};
use crate::domain::import_job::{DecodedSheet, ImportJob};
use crate::domain::types::{DuplicateAction, ImportStatus};
use crate::repository::catalog_repo_impl::{format_ts, parse_ts};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::import_job_repo::ImportJobRepository;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};

const JOB_COLUMNS: &str = "id, business_id, status, file_name, file_type, file_size, \
     total_rows, processed_rows, created_count, updated_count, skipped_count, failed_count, \
     duplicate_action, column_mapping_json, errors_json, warnings_json, results_json, \
     error_message, created_at, started_at, completed_at, rollback_at";

fn json_column<T: serde::de::DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn optional_ts(row: &Row, idx: usize) -> rusqlite::Result<Option<chrono::DateTime<chrono::Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.as_deref().map(parse_ts).transpose()
}

fn map_job(row: &Row) -> rusqlite::Result<ImportJob> {
    let status_raw: String = row.get(2)?;
    let status = ImportStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("未知作业状态: {}", status_raw).into(),
        )
    })?;
    let action_raw: String = row.get(12)?;
    let created_at: String = row.get(18)?;

    Ok(ImportJob {
        id: row.get(0)?,
        business_id: row.get(1)?,
        status,
        file_name: row.get(3)?,
        file_type: row.get(4)?,
        file_size: row.get::<_, i64>(5)? as u64,
        total_rows: row.get::<_, i64>(6)? as usize,
        processed_rows: row.get::<_, i64>(7)? as usize,
        created_count: row.get::<_, i64>(8)? as usize,
        updated_count: row.get::<_, i64>(9)? as usize,
        skipped_count: row.get::<_, i64>(10)? as usize,
        failed_count: row.get::<_, i64>(11)? as usize,
        duplicate_action: DuplicateAction::parse(&action_raw).unwrap_or_default(),
        column_mapping: json_column(row, 13)?,
        errors: json_column(row, 14)?,
        warnings: json_column(row, 15)?,
        results: json_column(row, 16)?,
        error_message: row.get(17)?,
        created_at: parse_ts(&created_at)?,
        started_at: optional_ts(row, 19)?,
        completed_at: optional_ts(row, 20)?,
        rollback_at: optional_ts(row, 21)?,
    })
}

// ==========================================
// ImportJobRepositoryImpl
// ==========================================
pub struct ImportJobRepositoryImpl {
    conn: Arc<Mutex<Connection>>,
}

impl ImportJobRepositoryImpl {
    /// 创建新的 Repository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径（":memory:" 用于测试）
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            ensure_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }
}

#[async_trait]
impl ImportJobRepository for ImportJobRepositoryImpl {
    async fn insert_job(&self, job: &ImportJob) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            &format!(
                "INSERT INTO import_job ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, \
                 ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
                JOB_COLUMNS
            ),
            params![
                job.id,
                job.business_id,
                job.status.as_str(),
                job.file_name,
                job.file_type,
                job.file_size as i64,
                job.total_rows as i64,
                job.processed_rows as i64,
                job.created_count as i64,
                job.updated_count as i64,
                job.skipped_count as i64,
                job.failed_count as i64,
                job.duplicate_action.as_str(),
                serde_json::to_string(&job.column_mapping)?,
                serde_json::to_string(&job.errors)?,
                serde_json::to_string(&job.warnings)?,
                serde_json::to_string(&job.results)?,
                job.error_message,
                format_ts(&job.created_at),
                job.started_at.as_ref().map(format_ts),
                job.completed_at.as_ref().map(format_ts),
                job.rollback_at.as_ref().map(format_ts),
            ],
        )?;
        Ok(())
    }

    async fn save_job(&self, job: &ImportJob) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE import_job SET
              status = ?2,
              total_rows = ?3,
              processed_rows = ?4,
              created_count = ?5,
              updated_count = ?6,
              skipped_count = ?7,
              failed_count = ?8,
              duplicate_action = ?9,
              column_mapping_json = ?10,
              errors_json = ?11,
              warnings_json = ?12,
              results_json = ?13,
              error_message = ?14,
              started_at = ?15,
              completed_at = ?16,
              rollback_at = ?17
            WHERE id = ?1
            "#,
            params![
                job.id,
                job.status.as_str(),
                job.total_rows as i64,
                job.processed_rows as i64,
                job.created_count as i64,
                job.updated_count as i64,
                job.skipped_count as i64,
                job.failed_count as i64,
                job.duplicate_action.as_str(),
                serde_json::to_string(&job.column_mapping)?,
                serde_json::to_string(&job.errors)?,
                serde_json::to_string(&job.warnings)?,
                serde_json::to_string(&job.results)?,
                job.error_message,
                job.started_at.as_ref().map(format_ts),
                job.completed_at.as_ref().map(format_ts),
                job.rollback_at.as_ref().map(format_ts),
            ],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "import_job".to_string(),
                id: job.id.clone(),
            });
        }
        Ok(())
    }

    async fn find_job(&self, job_id: &str) -> RepositoryResult<Option<ImportJob>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM import_job WHERE id = ?1", JOB_COLUMNS);
        let job = conn.query_row(&sql, params![job_id], map_job).optional()?;
        Ok(job)
    }

    async fn list_jobs(
        &self,
        business_id: &str,
        offset: usize,
        limit: usize,
    ) -> RepositoryResult<(Vec<ImportJob>, usize)> {
        let conn = self.get_conn()?;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM import_job WHERE business_id = ?1",
            params![business_id],
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {} FROM import_job WHERE business_id = ?1 \
             ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
            JOB_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let jobs = stmt
            .query_map(params![business_id, limit as i64, offset as i64], map_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((jobs, total as usize))
    }

    async fn save_staged_rows(&self, job_id: &str, sheet: &DecodedSheet) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO import_job_rows (job_id, sheet_json) VALUES (?1, ?2)
            ON CONFLICT(job_id) DO UPDATE SET sheet_json = excluded.sheet_json
            "#,
            params![job_id, serde_json::to_string(sheet)?],
        )?;
        Ok(())
    }

    async fn load_staged_rows(&self, job_id: &str) -> RepositoryResult<Option<DecodedSheet>> {
        let conn = self.get_conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT sheet_json FROM import_job_rows WHERE job_id = ?1",
                params![job_id],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
