// ==========================================
// 商品目录导入引擎 - API 层
// ==========================================
// 职责: 提供边界接口（输入解析 / 分页 / 错误转换）
// ==========================================

pub mod error;
pub mod import_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult, ErrorPayload};
pub use import_api::{ImportApi, ImportProgressResponse};
