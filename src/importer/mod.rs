// ==========================================
// 商品目录导入引擎 - 导入层
// ==========================================
// 流程: 解码 → 列映射 → 行校验 → 重复检测 → 执行 → (回滚)
// 状态: 作业生命周期由 JobStateMachine 唯一管理
// ==========================================

// 模块声明
pub mod column_mapper;
pub mod duplicate_detector;
pub mod error;
pub mod file_parser;
pub mod import_engine;
pub mod import_executor;
pub mod job_state;
pub mod rollback_manager;
pub mod row_validator;

// 重导出核心类型
pub use column_mapper::{normalize_header, ColumnMapper};
pub use duplicate_detector::{CatalogIndex, DuplicateDetector, DuplicateScan};
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvDecoder, ExcelDecoder, FileDecoder, UniversalDecoder};
pub use import_engine::ImportEngine;
pub use import_executor::{CancelSignal, ExecutionOutcome, ImportExecutor, KeyLocks, RowTask};
pub use job_state::JobStateMachine;
pub use rollback_manager::{RollbackManager, RollbackReport};
pub use row_validator::{RowValidator, ValidatedRow, ValidationOutcome};
