// ==========================================
// 商品目录导入引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 批量导入商品目录（校验 / 去重 / 执行 / 回滚）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 导入引擎
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 边界接口
pub mod api;

// 应用层 - 组件装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{DuplicateAction, ImportStatus, MatchField, RowOutcome};

// 领域实体
pub use domain::{
    DuplicateInfo, DuplicateReport, FileValidation, ImportHistoryPage, ImportJob, ImportRowError,
    ImportRowResult, ImportSummary, Product, ProductFields, UploadedFile, ValidationResult,
};

// 引擎
pub use importer::{ImportEngine, ImportError, ImportResult};

// API
pub use api::{ApiError, ImportApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "商品目录导入引擎";
