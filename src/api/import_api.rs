// ==========================================
// 商品目录导入API
// ==========================================
// 职责: 边界操作的输入解析、分页收敛、错误转换
// 说明: 业务逻辑全部在 ImportEngine，这里只做协议适配
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::import_job::{
    ColumnMapping, DuplicateReport, FileValidation, ImportHistoryPage, ImportJob, ImportSummary,
    UploadedFile,
};
use crate::domain::product::CellValue;
use crate::domain::types::{DuplicateAction, ImportStatus};
use crate::importer::ImportEngine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// 默认分页大小
pub const DEFAULT_PAGE_LIMIT: usize = 20;

/// 作业状态轮询响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgressResponse {
    pub job_id: String,
    pub status: ImportStatus,
    pub processed_rows: usize,
    pub total_rows: usize,
    /// 0..=100
    pub percent: u8,
    pub summary: ImportSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&ImportJob> for ImportProgressResponse {
    fn from(job: &ImportJob) -> Self {
        let percent = if job.total_rows == 0 {
            if job.status.is_terminal() { 100 } else { 0 }
        } else {
            (job.processed_rows * 100 / job.total_rows).min(100) as u8
        };
        Self {
            job_id: job.id.clone(),
            status: job.status,
            processed_rows: job.processed_rows,
            total_rows: job.total_rows,
            percent,
            summary: job.summary(),
            error_message: job.error_message.clone(),
        }
    }
}

/// 导入API
pub struct ImportApi {
    engine: Arc<ImportEngine>,
}

impl ImportApi {
    /// 创建新的ImportApi实例
    pub fn new(engine: Arc<ImportEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<ImportEngine> {
        &self.engine
    }

    /// 上传并校验文件
    ///
    /// # 参数
    /// - file_name: 原始文件名（用于格式识别）
    /// - file_type: MIME 类型，可为空
    pub async fn validate(
        &self,
        business_id: &str,
        file_name: &str,
        file_type: &str,
        bytes: Vec<u8>,
    ) -> ApiResult<FileValidation> {
        let business_id = require_non_empty("business_id", business_id)?;
        let file_name = require_non_empty("file_name", file_name)?;
        let file = UploadedFile::new(file_name, file_type.trim(), bytes);
        Ok(self.engine.validate(business_id, &file).await?)
    }

    /// 对调用方给出的行做重复检测
    pub async fn check_duplicates(
        &self,
        business_id: &str,
        mapping: &ColumnMapping,
        rows: &[BTreeMap<String, CellValue>],
    ) -> ApiResult<DuplicateReport> {
        let business_id = require_non_empty("business_id", business_id)?;
        Ok(self.engine.check_duplicates(business_id, mapping, rows).await?)
    }

    /// 对作业暂存的行做重复检测
    pub async fn check_job_duplicates(
        &self,
        job_id: &str,
        mapping: Option<&ColumnMapping>,
    ) -> ApiResult<DuplicateReport> {
        let job_id = require_non_empty("job_id", job_id)?;
        Ok(self.engine.check_job_duplicates(job_id, mapping).await?)
    }

    /// 确认映射与重复策略并开始执行
    ///
    /// # 参数
    /// - duplicate_action: "skip" / "update" / "create_new"（空串按 skip）
    pub async fn start_processing(
        &self,
        job_id: &str,
        confirmed_mapping: Option<ColumnMapping>,
        duplicate_action: &str,
    ) -> ApiResult<ImportJob> {
        let job_id = require_non_empty("job_id", job_id)?;
        let action = parse_duplicate_action(duplicate_action)?;
        debug!(job_id = %job_id, action = %action, "startProcessing 请求");
        Ok(self
            .engine
            .start_processing(job_id, confirmed_mapping, action)
            .await?)
    }

    pub async fn get_job(&self, job_id: &str) -> ApiResult<ImportJob> {
        let job_id = require_non_empty("job_id", job_id)?;
        Ok(self.engine.get_job(job_id).await?)
    }

    /// 轻量进度（轮询用）
    pub async fn get_progress(&self, job_id: &str) -> ApiResult<ImportProgressResponse> {
        let job = self.get_job(job_id).await?;
        Ok(ImportProgressResponse::from(&job))
    }

    pub async fn cancel(&self, job_id: &str) -> ApiResult<ImportJob> {
        let job_id = require_non_empty("job_id", job_id)?;
        Ok(self.engine.cancel(job_id).await?)
    }

    pub async fn rollback(&self, job_id: &str) -> ApiResult<ImportJob> {
        let job_id = require_non_empty("job_id", job_id)?;
        Ok(self.engine.rollback(job_id).await?)
    }

    /// 分页历史（page 至少为 1，limit 收敛到 1..=上限）
    pub async fn list_history(
        &self,
        business_id: &str,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> ApiResult<ImportHistoryPage> {
        let business_id = require_non_empty("business_id", business_id)?;
        let (page, limit) = clamp_page(page, limit, self.engine.config().history_max_limit);
        Ok(self.engine.list_history(business_id, page, limit).await?)
    }
}

fn require_non_empty<'a>(field: &str, value: &'a str) -> ApiResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::InvalidInput(format!("{} 不能为空", field)));
    }
    Ok(trimmed)
}

/// 解析重复处理策略
pub fn parse_duplicate_action(raw: &str) -> ApiResult<DuplicateAction> {
    if raw.trim().is_empty() {
        return Ok(DuplicateAction::default());
    }
    DuplicateAction::parse(raw).ok_or_else(|| {
        ApiError::InvalidInput(format!(
            "未知的重复处理策略: {}（可选 skip / update / create_new）",
            raw
        ))
    })
}

/// 分页参数收敛
pub fn clamp_page(page: Option<i64>, limit: Option<i64>, max_limit: usize) -> (usize, usize) {
    let max_limit = max_limit.max(1);
    let page = page.unwrap_or(1).max(1) as usize;
    let limit = limit
        .unwrap_or(DEFAULT_PAGE_LIMIT as i64)
        .clamp(1, max_limit as i64) as usize;
    (page, limit)
}
