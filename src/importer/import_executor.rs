// ==========================================
// 商品目录导入引擎 - 导入执行器
// ==========================================
// 职责: 按文件顺序把校验后的行写入目录，逐行记录结果
// 并行: 每批至多 max_parallel_rows 行并发，同一目录键（sku/barcode/name）串行
//       覆盖同一已有记录的行再按记录 ID 串行
// 取消: 批次之间检查取消信号；已开始的行允许完成
// 致命: 存储不可达立即中止剩余行，已提交的行保持原样（不自动回滚）
// 红线: 行级失败是结果值，不会中断批次
// ==========================================

use crate::domain::import_job::{DuplicateInfo, ImportJob, ImportRowResult, MappedRow};
use crate::domain::product::{field_keys, name_key, ProductDraft};
use crate::domain::types::{DuplicateAction, RowOutcome};
use crate::importer::duplicate_detector::CatalogIndex;
use crate::importer::row_validator::ValidatedRow;
use crate::repository::catalog_repo::{CandidateKeys, CatalogStore};
use crate::repository::error::RepositoryError;
use crate::repository::import_job_repo::ImportJobRepository;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

// ==========================================
// CancelSignal - 协作式取消标志
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ==========================================
// KeyLocks - 目录键级互斥
// ==========================================
// 多个键按字典序加锁，避免死锁
// 记录 ID 锁只在全部键锁之后单独获取，持有者不再等待其他锁
#[derive(Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    pub async fn acquire(&self, mut keys: Vec<String>) -> Vec<OwnedMutexGuard<()>> {
        keys.sort();
        keys.dedup();

        let handles: Vec<Arc<AsyncMutex<()>>> = {
            let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            keys.into_iter()
                .map(|k| map.entry(k).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }
        guards
    }
}

// ==========================================
// RowTask - 单行执行输入
// ==========================================
#[derive(Debug, Clone)]
pub struct RowTask {
    pub row: usize,
    pub sku: Option<String>,
    pub name: Option<String>,
    /// 校验通过时为 Some
    pub draft: Option<ProductDraft>,
    /// 校验失败摘要
    pub error: Option<String>,
    /// 预扫描得到的已有记录命中
    pub matched: Option<DuplicateInfo>,
}

impl RowTask {
    pub fn new(validated: &ValidatedRow, mapped: &MappedRow, matched: Option<DuplicateInfo>) -> Self {
        Self {
            row: validated.row,
            sku: mapped.text(field_keys::SKU),
            name: mapped.text(field_keys::NAME),
            draft: validated.draft.clone(),
            error: (!validated.is_valid()).then(|| validated.error_summary()),
            matched,
        }
    }

    fn lock_keys(draft: &ProductDraft) -> Vec<String> {
        let mut keys = vec![format!("name:{}", name_key(&draft.name))];
        if let Some(sku) = &draft.sku {
            keys.push(format!("sku:{}", sku));
        }
        if let Some(barcode) = &draft.barcode {
            keys.push(format!("barcode:{}", barcode));
        }
        keys
    }

    fn result(&self, status: RowOutcome, product_id: Option<String>) -> ImportRowResult {
        ImportRowResult {
            row: self.row,
            status,
            product_id,
            sku: self.sku.clone(),
            name: self.name.clone(),
            error: None,
            pre_image: None,
            commit_seq: None,
        }
    }

    fn failed(&self, error: impl Into<String>) -> ImportRowResult {
        ImportRowResult::failed(self.row, self.sku.clone(), self.name.clone(), error)
    }
}

/// 单行执行产物
enum RowApply {
    Done(ImportRowResult),
    Fatal(RepositoryError),
}

/// 整体执行结局（由编排器映射为作业终态）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed,
    Cancelled,
    Fatal(String),
}

// ==========================================
// ImportExecutor
// ==========================================
pub struct ImportExecutor {
    store: Arc<dyn CatalogStore>,
    jobs: Arc<dyn ImportJobRepository>,
    max_parallel_rows: usize,
    commits: AtomicU64,
}

impl ImportExecutor {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        jobs: Arc<dyn ImportJobRepository>,
        max_parallel_rows: usize,
    ) -> Self {
        Self {
            store,
            jobs,
            max_parallel_rows: max_parallel_rows.max(1),
            commits: AtomicU64::new(0),
        }
    }

    /// 执行全部行任务
    ///
    /// # 说明
    /// - 结果按文件顺序追加到 job.results，计数同步推进
    /// - 每批结束后持久化进度，供轮询读取
    /// - 作业状态迁移由调用方负责
    pub async fn run(
        &self,
        job: &mut ImportJob,
        tasks: Vec<RowTask>,
        cancel: &CancelSignal,
    ) -> ExecutionOutcome {
        let locks = KeyLocks::default();
        let action = job.duplicate_action;
        let business_id = job.business_id.clone();

        for batch in tasks.chunks(self.max_parallel_rows) {
            if cancel.is_cancelled() {
                info!(
                    job_id = %job.id,
                    processed = job.processed_rows,
                    "检测到取消信号，停止调度剩余行"
                );
                return ExecutionOutcome::Cancelled;
            }

            let applied = join_all(
                batch
                    .iter()
                    .map(|task| self.apply_row(&business_id, task, action, &locks)),
            )
            .await;

            let mut fatal = None;
            for (task, outcome) in batch.iter().zip(applied) {
                match outcome {
                    RowApply::Done(result) => job.record_row(result),
                    RowApply::Fatal(err) => {
                        warn!(job_id = %job.id, row = task.row, error = %err, "目录存储不可用");
                        fatal.get_or_insert(format!("第 {} 行处理时目录存储不可用: {}", task.row, err));
                    }
                }
            }

            if let Err(e) = self.jobs.save_job(job).await {
                warn!(job_id = %job.id, error = %e, "进度持久化失败");
            }

            if let Some(message) = fatal {
                return ExecutionOutcome::Fatal(message);
            }
        }

        ExecutionOutcome::Completed
    }

    async fn apply_row(
        &self,
        business_id: &str,
        task: &RowTask,
        action: DuplicateAction,
        locks: &KeyLocks,
    ) -> RowApply {
        // 1. 校验失败的行不触达目录
        let Some(draft) = &task.draft else {
            let error = task.error.clone().unwrap_or_else(|| "校验失败".to_string());
            return RowApply::Done(task.failed(error));
        };

        let _guards = locks.acquire(RowTask::lock_keys(draft)).await;

        match self.resolve_row(business_id, task, draft, action, locks).await {
            Ok(result) => {
                debug!(row = task.row, status = %result.status, "行已处理");
                RowApply::Done(result)
            }
            Err(err) if err.is_fatal() => RowApply::Fatal(err),
            Err(err) => RowApply::Done(task.failed(err.to_string())),
        }
    }

    /// 持键锁时执行：决定命中、应用策略、写目录
    async fn resolve_row(
        &self,
        business_id: &str,
        task: &RowTask,
        draft: &ProductDraft,
        action: DuplicateAction,
        locks: &KeyLocks,
    ) -> Result<ImportRowResult, RepositoryError> {
        let existing_id = match (&task.matched, action) {
            (_, DuplicateAction::CreateNew) => None,
            (Some(hit), _) => Some(hit.existing_product_id.clone()),
            // 本次运行中较早的行可能已创建同键记录
            (None, _) => self.live_match(business_id, task.row, draft).await?,
        };

        let Some(existing_id) = existing_id else {
            return self.create_row(business_id, task, draft).await;
        };

        match action {
            DuplicateAction::Skip => Ok(task.result(RowOutcome::Skipped, Some(existing_id))),
            DuplicateAction::Update => {
                // 不同键的行可能命中同一记录：读前像到写回之间按记录 ID 互斥
                let _record = locks.acquire(vec![format!("id:{}", existing_id)]).await;
                let Some(existing) = self.store.get_product(&existing_id).await? else {
                    return Ok(task.failed(format!("待覆盖的记录已不存在: {}", existing_id)));
                };
                let pre_image = existing.fields;
                self.store
                    .update_product(&existing_id, &draft.overlay(&pre_image))
                    .await?;
                let mut result = task.result(RowOutcome::Updated, Some(existing_id));
                result.pre_image = Some(pre_image);
                result.commit_seq = Some(self.next_commit());
                Ok(result)
            }
            DuplicateAction::CreateNew => self.create_row(business_id, task, draft).await,
        }
    }

    async fn create_row(
        &self,
        business_id: &str,
        task: &RowTask,
        draft: &ProductDraft,
    ) -> Result<ImportRowResult, RepositoryError> {
        let created = self
            .store
            .create_product(business_id, &draft.to_new_fields())
            .await?;
        let mut result = task.result(RowOutcome::Created, Some(created.id));
        result.commit_seq = Some(self.next_commit());
        Ok(result)
    }

    fn next_commit(&self) -> u64 {
        self.commits.fetch_add(1, Ordering::SeqCst)
    }

    async fn live_match(
        &self,
        business_id: &str,
        row: usize,
        draft: &ProductDraft,
    ) -> Result<Option<String>, RepositoryError> {
        let keys = CandidateKeys {
            skus: draft.sku.iter().cloned().collect(),
            barcodes: draft.barcode.iter().cloned().collect(),
            names: vec![name_key(&draft.name)],
        };
        let products = self.store.find_candidates(business_id, &keys).await?;
        if products.is_empty() {
            return Ok(None);
        }
        let hit = CatalogIndex::from_products(products).match_values(
            row,
            draft.sku.clone(),
            draft.barcode.clone(),
            Some(draft.name.clone()),
        );
        Ok(hit.map(|h| h.existing_product_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancel_signal_shared() {
        let signal = CancelSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_cancelled());
        signal.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_lock_keys_cover_all_identities() {
        let draft = ProductDraft {
            name: "Widget".to_string(),
            sku: Some("W-1".to_string()),
            ..Default::default()
        };
        let keys = RowTask::lock_keys(&draft);
        assert_eq!(keys, vec!["name:widget".to_string(), "sku:W-1".to_string()]);
    }

    #[tokio::test]
    async fn test_record_lock_is_independent_of_key_locks() {
        let locks = KeyLocks::default();
        let _keys = locks.acquire(vec!["sku:A".to_string()]).await;
        let record = tokio::time::timeout(
            Duration::from_secs(1),
            locks.acquire(vec!["id:p-1".to_string()]),
        )
        .await
        .unwrap();
        assert_eq!(record.len(), 1);
    }

    #[tokio::test]
    async fn test_key_locks_serialize_same_key() {
        let locks = Arc::new(KeyLocks::default());
        let first = locks.acquire(vec!["sku:A".to_string()]).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(vec!["sku:A".to_string(), "name:x".to_string()]).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }
}
