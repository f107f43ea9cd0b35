// ==========================================
// 商品目录导入引擎 - 配置层
// ==========================================
// 职责: 导入引擎参数读取（阈值 / 并行度 / 分页上限）
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod engine_config;
pub mod import_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use engine_config::ImportEngineConfig;
pub use import_config_trait::ImportConfigReader;
