// ==========================================
// 商品目录导入引擎 - 作业状态机
// ==========================================
// 职责: 唯一的 status 写入口 + 迁移时间戳
// 红线: 非法迁移返回 InvalidTransition，作业保持原样
// ==========================================

use crate::domain::import_job::ImportJob;
use crate::domain::types::ImportStatus;
use crate::importer::error::{ImportError, ImportResult};
use chrono::Utc;
use tracing::debug;

pub struct JobStateMachine;

impl JobStateMachine {
    /// 受保护的状态迁移
    ///
    /// # 时间戳
    /// - → processing: started_at
    /// - → completed / failed / cancelled: completed_at
    /// - → rolled_back: rollback_at
    pub fn transition(job: &mut ImportJob, to: ImportStatus) -> ImportResult<()> {
        let from = job.status;
        if !from.can_transition_to(to) {
            return Err(ImportError::InvalidTransition { from, to });
        }

        let now = Utc::now();
        match to {
            ImportStatus::Processing => job.started_at = Some(now),
            ImportStatus::Completed | ImportStatus::Failed | ImportStatus::Cancelled => {
                job.completed_at = Some(now)
            }
            ImportStatus::RolledBack => job.rollback_at = Some(now),
            _ => {}
        }
        job.status = to;

        debug!(job_id = %job.id, from = %from, to = %to, "作业状态迁移");
        Ok(())
    }

    /// 迁移到 failed 并记录原因
    pub fn fail(job: &mut ImportJob, message: impl Into<String>) -> ImportResult<()> {
        Self::transition(job, ImportStatus::Failed)?;
        job.error_message = Some(message.into());
        Ok(())
    }
}
