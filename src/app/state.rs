// ==========================================
// 商品目录导入引擎 - 应用状态
// ==========================================
// 职责: 打开共享数据库连接，装配仓储 / 配置 / 引擎 / API
// ==========================================

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::api::ImportApi;
use crate::config::{ConfigManager, ImportEngineConfig};
use crate::db::open_sqlite_connection;
use crate::importer::ImportEngine;
use crate::repository::{ImportJobRepositoryImpl, ProductCatalogRepository, RepositoryError};

/// 应用状态
///
/// 所有组件共享同一个 SQLite 连接
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 商品目录仓储
    pub catalog_repo: Arc<ProductCatalogRepository>,

    /// 导入作业仓储
    pub job_repo: Arc<ImportJobRepositoryImpl>,

    /// 导入API
    pub import_api: Arc<ImportApi>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 说明
    /// 1. 打开数据库并建表
    /// 2. 读取导入引擎配置
    /// 3. 创建引擎与 API
    pub async fn new(db_path: String) -> Result<Self, RepositoryError> {
        tracing::info!(db_path = %db_path, "初始化AppState");

        let conn = open_sqlite_connection(&db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let config_manager = Arc::new(ConfigManager::from_connection(conn.clone())?);
        let catalog_repo = Arc::new(ProductCatalogRepository::from_connection(conn.clone())?);
        let job_repo = Arc::new(ImportJobRepositoryImpl::from_connection(conn)?);

        // ==========================================
        // 初始化引擎与API
        // ==========================================
        let config = ImportEngineConfig::load(config_manager.as_ref()).await?;
        tracing::info!(
            fuzzy_match_threshold = config.fuzzy_match_threshold,
            max_parallel_rows = config.max_parallel_rows,
            "导入引擎配置已加载"
        );
        let engine = Arc::new(ImportEngine::new(
            catalog_repo.clone(),
            job_repo.clone(),
            config,
        ));
        let import_api = Arc::new(ImportApi::new(engine));

        Ok(Self {
            db_path,
            config_manager,
            catalog_repo,
            job_repo,
            import_api,
        })
    }
}

/// 默认数据库路径
///
/// 优先级: CATALOG_IMPORT_DB_PATH 环境变量 > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/CI）
    if let Ok(path) = std::env::var("CATALOG_IMPORT_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./catalog_import.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("catalog-import");
        // 目录创建失败时退回当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("catalog_import.db");
        }
    }

    path.to_string_lossy().to_string()
}
