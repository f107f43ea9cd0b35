// ==========================================
// 商品目录导入引擎 - 导入作业领域模型
// ==========================================
// 职责: ImportJob 聚合根 + 行错误/行结果/校验快照/重复信息/汇总
// 红线: created + updated + skipped + failed == processed_rows（任意观测点）
// 红线: status 只由 JobStateMachine 迁移，其余组件只追加各自负责的字段
// ==========================================

use crate::domain::product::{CellValue, ProductFields};
use crate::domain::types::{DuplicateAction, ImportStatus, MatchField, RowOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// 表头 → 规范字段键
pub type ColumnMapping = BTreeMap<String, String>;

// ==========================================
// UploadedFile - 上传文件（未解码）
// ==========================================
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub file_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, file_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            file_type: file_type.into(),
            bytes,
        }
    }

    pub fn file_size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

// ==========================================
// DecodedSheet - 文件解码结果
// ==========================================
// 行按文件顺序；每行以表头为键
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodedSheet {
    pub headers: Vec<String>,
    pub rows: Vec<BTreeMap<String, CellValue>>,
}

// ==========================================
// MappedRow - 按规范字段键组织的行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedRow {
    pub row: usize, // 数据行号（从 1 开始，不含表头）
    pub values: BTreeMap<String, CellValue>,
}

impl MappedRow {
    /// 取非空文本值
    pub fn text(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .filter(|v| !v.is_blank())
            .map(|v| v.as_text())
    }
}

// ==========================================
// ImportRowError - 行级错误/警告
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRowError {
    pub row: usize,
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ImportRowError {
    pub fn new(row: usize, field: &str, message: impl Into<String>, value: Option<String>) -> Self {
        Self {
            row,
            field: field.to_string(),
            message: message.into(),
            value,
        }
    }
}

// ==========================================
// ImportRowResult - 行执行结果
// ==========================================
// 追加写：每个已处理行一条，保持文件顺序
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRowResult {
    pub row: usize,
    pub status: RowOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 覆盖前的字段快照（仅 updated 行），回滚依据
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_image: Option<ProductFields>,
    /// 目录写入的提交序号（created / updated 行），回滚按其逆序撤销
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_seq: Option<u64>,
}

impl ImportRowResult {
    pub fn failed(row: usize, sku: Option<String>, name: Option<String>, error: impl Into<String>) -> Self {
        Self {
            row,
            status: RowOutcome::Failed,
            product_id: None,
            sku,
            name,
            error: Some(error.into()),
            pre_image: None,
            commit_seq: None,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self.status, RowOutcome::Created | RowOutcome::Updated)
    }
}

// ==========================================
// ValidationResult - 校验阶段快照
// ==========================================
// 校验完成后不可重算
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ImportRowError>,
    pub warnings: Vec<ImportRowError>,
    pub valid_rows: usize,
    pub total_rows: usize,
}

// ==========================================
// DuplicateInfo - 与已有记录的碰撞
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateInfo {
    pub row: usize,
    pub field: MatchField,
    pub value: String,
    pub existing_product_id: String,
    pub existing_product_name: String,
}

// ==========================================
// ImportSummary - 派生汇总（不是独立事实来源）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub total_rows: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

// ==========================================
// ImportJob - 聚合根
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub id: String,
    pub business_id: String,
    pub status: ImportStatus,

    // ===== 文件元信息 =====
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,

    // ===== 进度与计数 =====
    pub total_rows: usize,
    pub processed_rows: usize,
    pub created_count: usize,
    pub updated_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,

    // ===== 处理参数 =====
    pub duplicate_action: DuplicateAction,
    pub column_mapping: ColumnMapping,

    // ===== 累积输出 =====
    pub errors: Vec<ImportRowError>,
    pub warnings: Vec<ImportRowError>,
    pub results: Vec<ImportRowResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    // ===== 时间戳 =====
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    /// 上传时创建（pending）
    pub fn new(business_id: &str, file: &UploadedFile) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            business_id: business_id.to_string(),
            status: ImportStatus::Pending,
            file_name: file.file_name.clone(),
            file_type: file.file_type.clone(),
            file_size: file.file_size(),
            total_rows: 0,
            processed_rows: 0,
            created_count: 0,
            updated_count: 0,
            skipped_count: 0,
            failed_count: 0,
            duplicate_action: DuplicateAction::default(),
            column_mapping: ColumnMapping::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            results: Vec::new(),
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            rollback_at: None,
        }
    }

    /// 追加一条行结果并同步推进计数
    pub fn record_row(&mut self, result: ImportRowResult) {
        match result.status {
            RowOutcome::Created => self.created_count += 1,
            RowOutcome::Updated => self.updated_count += 1,
            RowOutcome::Skipped => self.skipped_count += 1,
            RowOutcome::Failed => self.failed_count += 1,
        }
        self.processed_rows += 1;
        self.results.push(result);
    }

    pub fn summary(&self) -> ImportSummary {
        ImportSummary {
            total_rows: self.total_rows,
            created: self.created_count,
            updated: self.updated_count,
            skipped: self.skipped_count,
            failed: self.failed_count,
        }
    }

    /// 计数守恒检查
    pub fn counters_consistent(&self) -> bool {
        self.created_count + self.updated_count + self.skipped_count + self.failed_count
            == self.processed_rows
            && self.processed_rows <= self.total_rows
            && self.results.len() == self.processed_rows
    }

    pub fn committed_rows(&self) -> usize {
        self.results.iter().filter(|r| r.is_committed()).count()
    }
}

// ==========================================
// 边界操作返回形状
// ==========================================

/// validate(file) 返回
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileValidation {
    pub job_id: String,
    pub status: ImportStatus,
    pub headers: Vec<String>,
    pub suggested_mapping: ColumnMapping,
    pub sample_data: Vec<BTreeMap<String, CellValue>>,
    pub validation: ValidationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// checkDuplicates(mapping, rows) 返回
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateReport {
    pub total_rows: usize,
    pub duplicate_count: usize,
    pub unique_count: usize,
    pub duplicates: Vec<DuplicateInfo>,
}

/// listHistory(page, limit) 返回
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportHistoryPage {
    pub jobs: Vec<ImportJob>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_job() -> ImportJob {
        let file = UploadedFile::new("products.csv", "text/csv", b"Name\nA\n".to_vec());
        let mut job = ImportJob::new("biz-1", &file);
        job.total_rows = 3;
        job
    }

    #[test]
    fn test_record_row_keeps_counters_consistent() {
        let mut job = test_job();
        job.record_row(ImportRowResult {
            row: 1,
            status: RowOutcome::Created,
            product_id: Some("p1".to_string()),
            sku: None,
            name: Some("A".to_string()),
            error: None,
            pre_image: None,
            commit_seq: None,
        });
        job.record_row(ImportRowResult::failed(2, None, None, "bad"));

        assert_eq!(job.processed_rows, 2);
        assert_eq!(job.created_count, 1);
        assert_eq!(job.failed_count, 1);
        assert!(job.counters_consistent());
        assert_eq!(job.committed_rows(), 1);
    }

    #[test]
    fn test_summary_mirrors_counters() {
        let mut job = test_job();
        job.record_row(ImportRowResult::failed(1, None, None, "bad"));
        let summary = job.summary();

        assert_eq!(summary.total_rows, 3);
        assert_eq!(summary.failed, job.failed_count);
        assert_eq!(summary.created + summary.updated + summary.skipped + summary.failed, job.processed_rows);
    }

    #[test]
    fn test_job_json_shape() {
        let job = test_job();
        let value = serde_json::to_value(&job).unwrap();

        assert_eq!(value["status"], "pending");
        assert_eq!(value["businessId"], "biz-1");
        assert_eq!(value["fileSize"], 7);
        assert_eq!(value["duplicateAction"], "skip");
        assert!(value.get("rollbackAt").is_none());
    }
}
