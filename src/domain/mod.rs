// ==========================================
// 商品目录导入引擎 - 领域模型层
// ==========================================
// 职责: 定义导入作业、商品、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod import_job;
pub mod product;
pub mod types;

// 重导出核心类型
pub use import_job::{
    ColumnMapping, DecodedSheet, DuplicateInfo, DuplicateReport, FileValidation,
    ImportHistoryPage, ImportJob, ImportRowError, ImportRowResult, ImportSummary, MappedRow,
    UploadedFile, ValidationResult,
};
pub use product::{
    field_keys, name_key, product_field_catalog, CellValue, FieldDef, FieldKind, Product,
    ProductDraft, ProductFields,
};
pub use types::{DuplicateAction, ImportStatus, MatchField, RowOutcome};
