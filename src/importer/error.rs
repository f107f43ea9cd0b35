// ==========================================
// 商品目录导入引擎 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 约定: 行级问题是数据（ImportRowError / ImportRowResult），不走 Err
//       Err 只用于结构性失败、请求级拒绝与存储故障
// ==========================================

use crate::domain::types::ImportStatus;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误（结构性）=====
    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xls/.csv）")]
    UnsupportedFormat(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("文件为空: {0}")]
    EmptyFile(String),

    // ===== 映射错误（结构性）=====
    #[error("必填字段未映射: {}", .0.join(", "))]
    MissingRequiredMapping(Vec<String>),

    #[error("列映射无效: {0}")]
    InvalidMapping(String),

    // ===== 作业生命周期错误 =====
    #[error("无效的状态转换: from={from} to={to}")]
    InvalidTransition { from: ImportStatus, to: ImportStatus },

    #[error("作业正在 {status} 阶段，拒绝并发请求: job_id={job_id}")]
    Conflict { job_id: String, status: ImportStatus },

    #[error("导入作业未找到: {0}")]
    JobNotFound(String),

    #[error("没有可回滚的已提交行: job_id={0}")]
    NothingToRollback(String),

    #[error("无效输入: {0}")]
    InvalidInput(String),

    // ===== 存储错误 =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 整个文件层面的缺陷（作业 validating → failed）
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ImportError::FileReadError(_)
                | ImportError::UnsupportedFormat(_)
                | ImportError::CsvParseError(_)
                | ImportError::ExcelParseError(_)
                | ImportError::EmptyFile(_)
                | ImportError::MissingRequiredMapping(_)
        )
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
