// ==========================================
// 商品目录导入引擎 - 回滚管理器
// ==========================================
// 职责: 逆向撤销作业已提交的行
//   created → 按 ID 删除
//   updated → 写回执行时捕获的前像
//   skipped / failed → 无操作
// 顺序: 按提交逆序（同一记录被多行覆盖时，最早的前像最后写回）
//       无提交序号的结果按文件逆序
// 红线: 单行撤销失败只记录，不中断其余行
// ==========================================

use crate::domain::import_job::{ImportJob, ImportRowResult};
use crate::domain::types::RowOutcome;
use crate::repository::catalog_repo::CatalogStore;
use crate::repository::error::RepositoryError;
use std::sync::Arc;
use tracing::{debug, warn};

/// 回滚汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    pub reverted: usize,
    /// (行号, 原因)，按行号升序
    pub failures: Vec<(usize, String)>,
}

impl RollbackReport {
    /// 部分回滚时写入作业的 error_message
    pub fn failure_message(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        let detail = self
            .failures
            .iter()
            .map(|(row, reason)| format!("第 {} 行: {}", row, reason))
            .collect::<Vec<_>>()
            .join("; ");
        Some(format!("{} 行未能回滚 ({})", self.failures.len(), detail))
    }
}

pub struct RollbackManager {
    store: Arc<dyn CatalogStore>,
}

impl RollbackManager {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// 撤销作业的全部已提交行
    pub async fn revert(&self, job: &ImportJob) -> RollbackReport {
        let mut report = RollbackReport::default();

        let mut committed: Vec<&ImportRowResult> =
            job.results.iter().filter(|r| r.is_committed()).collect();
        committed.sort_by(|a, b| (b.commit_seq, b.row).cmp(&(a.commit_seq, a.row)));

        for result in committed {
            match self.revert_row(result).await {
                Ok(()) => {
                    report.reverted += 1;
                    debug!(job_id = %job.id, row = result.row, status = %result.status, "行已回滚");
                }
                Err(reason) => {
                    warn!(job_id = %job.id, row = result.row, reason = %reason, "行回滚失败");
                    report.failures.push((result.row, reason));
                }
            }
        }

        report.failures.sort_by_key(|(row, _)| *row);
        report
    }

    async fn revert_row(&self, result: &ImportRowResult) -> Result<(), String> {
        let product_id = result
            .product_id
            .as_deref()
            .ok_or_else(|| "缺少商品 ID".to_string())?;

        match result.status {
            RowOutcome::Created => match self.store.delete_product(product_id).await {
                // 记录已不在目录中，目标状态已达成
                Ok(()) | Err(RepositoryError::NotFound { .. }) => Ok(()),
                Err(e) => Err(e.to_string()),
            },
            RowOutcome::Updated => {
                let pre_image = result
                    .pre_image
                    .as_ref()
                    .ok_or_else(|| "缺少覆盖前快照".to_string())?;
                self.store
                    .update_product(product_id, pre_image)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }
            RowOutcome::Skipped | RowOutcome::Failed => Ok(()),
        }
    }
}
