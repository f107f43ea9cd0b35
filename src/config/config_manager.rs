// ==========================================
// 商品目录导入引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、写入
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::db::{ensure_schema, open_sqlite_connection};
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// 配置键
// ==========================================
pub mod config_keys {
    pub const FUZZY_MATCH_THRESHOLD: &str = "import.fuzzy_match_threshold";
    pub const MAX_PARALLEL_ROWS: &str = "import.max_parallel_rows";
    pub const SAMPLE_ROWS: &str = "import.sample_rows";
    pub const HISTORY_MAX_LIMIT: &str = "import.history_max_limit";
}

pub const DEFAULT_FUZZY_MATCH_THRESHOLD: f64 = 0.85;
pub const DEFAULT_MAX_PARALLEL_ROWS: usize = 1;
pub const MAX_PARALLEL_ROWS_CAP: usize = 32;
pub const DEFAULT_SAMPLE_ROWS: usize = 5;
pub const DEFAULT_HISTORY_MAX_LIMIT: usize = 100;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            ensure_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 读取并解析配置值，不存在时返回默认值
    fn get_parsed_or_default<T: FromStr>(&self, key: &str, default: T) -> RepositoryResult<T> {
        match self.get_config_value(key)? {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<T>().map_err(|_| RepositoryError::FieldValueError {
                field: key.to_string(),
                message: format!("配置值格式错误: {}", raw),
            }),
        }
    }

    /// 写入 global scope 配置（UPSERT）
    pub fn set_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }
}

#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_fuzzy_match_threshold(&self) -> RepositoryResult<f64> {
        let value = self.get_parsed_or_default(
            config_keys::FUZZY_MATCH_THRESHOLD,
            DEFAULT_FUZZY_MATCH_THRESHOLD,
        )?;
        if !(0.0..=1.0).contains(&value) {
            return Err(RepositoryError::FieldValueError {
                field: config_keys::FUZZY_MATCH_THRESHOLD.to_string(),
                message: format!("阈值必须在 [0, 1] 内: {}", value),
            });
        }
        Ok(value)
    }

    async fn get_max_parallel_rows(&self) -> RepositoryResult<usize> {
        let value =
            self.get_parsed_or_default(config_keys::MAX_PARALLEL_ROWS, DEFAULT_MAX_PARALLEL_ROWS)?;
        Ok(value.clamp(1, MAX_PARALLEL_ROWS_CAP))
    }

    async fn get_sample_rows(&self) -> RepositoryResult<usize> {
        self.get_parsed_or_default(config_keys::SAMPLE_ROWS, DEFAULT_SAMPLE_ROWS)
    }

    async fn get_history_max_limit(&self) -> RepositoryResult<usize> {
        let value =
            self.get_parsed_or_default(config_keys::HISTORY_MAX_LIMIT, DEFAULT_HISTORY_MAX_LIMIT)?;
        Ok(value.max(1))
    }
}
