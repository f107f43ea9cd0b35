// ==========================================
// 商品目录导入引擎 - 领域类型定义
// ==========================================
// 职责: 作业状态 / 重复处理策略 / 行结果状态 / 匹配字段
// 序列化格式: snake_case (与持久化 JSON 一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 导入作业状态 (Import Status)
// ==========================================
// 红线: 状态只能经 JobStateMachine 迁移，禁止字符串直接改写
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Pending,    // 已上传，等待校验
    Validating, // 校验中
    Validated,  // 校验完成（映射结构可用）
    Processing, // 执行中
    Completed,  // 执行完成
    Failed,     // 结构性失败 / 致命错误
    Cancelled,  // 已取消
    RolledBack, // 已回滚（终态）
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Pending => "pending",
            ImportStatus::Validating => "validating",
            ImportStatus::Validated => "validated",
            ImportStatus::Processing => "processing",
            ImportStatus::Completed => "completed",
            ImportStatus::Failed => "failed",
            ImportStatus::Cancelled => "cancelled",
            ImportStatus::RolledBack => "rolled_back",
        }
    }

    pub fn parse(s: &str) -> Option<ImportStatus> {
        match s.trim() {
            "pending" => Some(ImportStatus::Pending),
            "validating" => Some(ImportStatus::Validating),
            "validated" => Some(ImportStatus::Validated),
            "processing" => Some(ImportStatus::Processing),
            "completed" => Some(ImportStatus::Completed),
            "failed" => Some(ImportStatus::Failed),
            "cancelled" => Some(ImportStatus::Cancelled),
            "rolled_back" => Some(ImportStatus::RolledBack),
            _ => None,
        }
    }

    /// 合法迁移边（唯一事实来源）
    pub fn can_transition_to(&self, to: ImportStatus) -> bool {
        use ImportStatus::*;
        matches!(
            (self, to),
            (Pending, Validating)
                | (Validating, Validated)
                | (Validating, Failed)
                | (Validated, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
                | (Completed, RolledBack)
                | (Failed, RolledBack)
                | (Cancelled, RolledBack)
        )
    }

    /// 执行阶段结束后的状态（可回滚）
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportStatus::Completed
                | ImportStatus::Failed
                | ImportStatus::Cancelled
                | ImportStatus::RolledBack
        )
    }

    /// 单写者阶段：校验中 / 执行中
    pub fn is_busy(&self) -> bool {
        matches!(self, ImportStatus::Validating | ImportStatus::Processing)
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 重复处理策略 (Duplicate Action)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateAction {
    #[default]
    Skip,      // 跳过，不改动已有记录
    Update,    // 覆盖已有记录（需前像快照）
    CreateNew, // 忽略匹配，强制新建
}

impl DuplicateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateAction::Skip => "skip",
            DuplicateAction::Update => "update",
            DuplicateAction::CreateNew => "create_new",
        }
    }

    pub fn parse(s: &str) -> Option<DuplicateAction> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Some(DuplicateAction::Skip),
            "update" | "overwrite" => Some(DuplicateAction::Update),
            "create_new" | "create" => Some(DuplicateAction::CreateNew),
            _ => None,
        }
    }
}

impl fmt::Display for DuplicateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 行处理结果状态 (Row Outcome)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    Created,
    Updated,
    Skipped,
    Failed,
}

impl fmt::Display for RowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowOutcome::Created => write!(f, "created"),
            RowOutcome::Updated => write!(f, "updated"),
            RowOutcome::Skipped => write!(f, "skipped"),
            RowOutcome::Failed => write!(f, "failed"),
        }
    }
}

// ==========================================
// 重复匹配字段 (Match Field)
// ==========================================
// 优先级: Sku > Barcode > Name（声明顺序即优先级）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    Sku,
    Barcode,
    Name,
}

impl MatchField {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchField::Sku => "sku",
            MatchField::Barcode => "barcode",
            MatchField::Name => "name",
        }
    }
}

impl fmt::Display for MatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
