// ==========================================
// 商品目录导入引擎 - 导入编排器
// ==========================================
// 职责: 边界操作编排
//   validate → checkDuplicates → startProcessing → getJob(轮询) → cancel / rollback
//   listHistory 分页
// 单写者: validating / processing 期间拒绝对同一作业的回滚与重复执行
// 进度: 执行在后台任务中进行，processed_rows 按批持久化
// ==========================================

use crate::config::ImportEngineConfig;
use crate::domain::import_job::{
    ColumnMapping, DecodedSheet, DuplicateReport, FileValidation, ImportHistoryPage, ImportJob,
    UploadedFile,
};
use crate::domain::product::{product_field_catalog, CellValue};
use crate::domain::types::{DuplicateAction, ImportStatus};
use crate::importer::column_mapper::ColumnMapper;
use crate::importer::duplicate_detector::DuplicateDetector;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{FileDecoder, UniversalDecoder};
use crate::importer::import_executor::{CancelSignal, ExecutionOutcome, ImportExecutor, RowTask};
use crate::importer::job_state::JobStateMachine;
use crate::importer::rollback_manager::RollbackManager;
use crate::importer::row_validator::RowValidator;
use crate::repository::catalog_repo::CatalogStore;
use crate::repository::import_job_repo::ImportJobRepository;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

/// 正在后台执行的作业
struct RunningJob {
    cancel: CancelSignal,
    /// 执行结果落库后置为 true，任意数量的等待者可各自订阅
    done: watch::Receiver<bool>,
}

type RunningJobs = Arc<Mutex<HashMap<String, RunningJob>>>;

// ==========================================
// JobClaim - 进程内单写者占用
// ==========================================
// 作用域结束即释放
struct JobClaim {
    claims: Arc<Mutex<HashSet<String>>>,
    job_id: String,
}

impl Drop for JobClaim {
    fn drop(&mut self) {
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.job_id);
    }
}

// ==========================================
// ImportEngine
// ==========================================
pub struct ImportEngine {
    store: Arc<dyn CatalogStore>,
    jobs: Arc<dyn ImportJobRepository>,
    decoder: Arc<dyn FileDecoder>,
    config: ImportEngineConfig,
    mapper: ColumnMapper,
    validator: RowValidator,
    claims: Arc<Mutex<HashSet<String>>>,
    running: RunningJobs,
}

impl ImportEngine {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        jobs: Arc<dyn ImportJobRepository>,
        config: ImportEngineConfig,
    ) -> Self {
        Self::with_decoder(store, jobs, Arc::new(UniversalDecoder), config)
    }

    pub fn with_decoder(
        store: Arc<dyn CatalogStore>,
        jobs: Arc<dyn ImportJobRepository>,
        decoder: Arc<dyn FileDecoder>,
        config: ImportEngineConfig,
    ) -> Self {
        Self {
            store,
            jobs,
            decoder,
            mapper: ColumnMapper::new(product_field_catalog(), config.fuzzy_match_threshold),
            validator: RowValidator::new(product_field_catalog()),
            config,
            claims: Arc::new(Mutex::new(HashSet::new())),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &ImportEngineConfig {
        &self.config
    }

    // ==========================================
    // validate(file)
    // ==========================================

    /// 上传并校验文件
    ///
    /// # 返回
    /// - Ok(FileValidation): 作业已到达 validated 或 failed（结构性失败写入 error_message）
    /// - Err: 仅存储故障；作业进入 validating 之后的故障会先把作业置为 failed
    #[instrument(skip(self, file), fields(file_name = %file.file_name, file_size = file.file_size()))]
    pub async fn validate(&self, business_id: &str, file: &UploadedFile) -> ImportResult<FileValidation> {
        let mut job = ImportJob::new(business_id, file);
        self.jobs.insert_job(&job).await?;
        info!(job_id = %job.id, business_id = %business_id, "导入作业已创建");

        JobStateMachine::transition(&mut job, ImportStatus::Validating)?;
        self.jobs.save_job(&job).await?;

        match self.run_validation(&mut job, file).await {
            Ok(validation) => Ok(validation),
            Err(cause) => {
                self.abandon_validation(&mut job, &cause).await;
                Err(cause)
            }
        }
    }

    async fn run_validation(
        &self,
        job: &mut ImportJob,
        file: &UploadedFile,
    ) -> ImportResult<FileValidation> {
        let started = Instant::now();

        // 1. 解码
        let sheet = match self.decoder.decode(file) {
            Ok(sheet) => sheet,
            Err(e) => return self.fail_structurally(job, Vec::new(), ColumnMapping::new(), e).await,
        };
        job.total_rows = sheet.rows.len();

        // 2. 建议映射 + 必填字段检查
        let suggested = self.mapper.suggest(&sheet.headers);
        job.column_mapping = suggested.clone();
        if let Err(e) = self.mapper.check_mapping(&suggested) {
            return self.fail_structurally(job, sheet.headers, suggested, e).await;
        }

        // 3. 行校验
        let mapped = self.mapper.apply(&sheet, &suggested);
        let outcome = self.validator.validate(&mapped);
        job.errors = outcome.result.errors.clone();
        job.warnings = outcome.result.warnings.clone();

        // 4. 暂存解码行，供执行阶段读取
        self.jobs.save_staged_rows(&job.id, &sheet).await?;

        // 落库成功前内存中的作业保持 validating
        let mut validated = job.clone();
        JobStateMachine::transition(&mut validated, ImportStatus::Validated)?;
        self.jobs.save_job(&validated).await?;
        *job = validated;

        info!(
            job_id = %job.id,
            total_rows = job.total_rows,
            valid_rows = outcome.result.valid_rows,
            errors = outcome.result.errors.len(),
            warnings = outcome.result.warnings.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "文件校验完成"
        );

        Ok(FileValidation {
            job_id: job.id.clone(),
            status: job.status,
            sample_data: self.sample(&sheet),
            headers: sheet.headers,
            suggested_mapping: suggested,
            validation: outcome.result,
            error_message: None,
        })
    }

    async fn fail_structurally(
        &self,
        job: &mut ImportJob,
        headers: Vec<String>,
        suggested: ColumnMapping,
        cause: ImportError,
    ) -> ImportResult<FileValidation> {
        if !cause.is_structural() {
            return Err(cause);
        }
        warn!(job_id = %job.id, error = %cause, "文件结构性失败");
        JobStateMachine::fail(job, cause.to_string())?;
        self.jobs.save_job(job).await?;

        Ok(FileValidation {
            job_id: job.id.clone(),
            status: job.status,
            headers,
            suggested_mapping: suggested,
            sample_data: Vec::new(),
            validation: Default::default(),
            error_message: job.error_message.clone(),
        })
    }

    /// 校验中途的存储故障：作业置为 failed 并尽力落库，不再占用单写者状态
    async fn abandon_validation(&self, job: &mut ImportJob, cause: &ImportError) {
        error!(job_id = %job.id, error = %cause, "校验阶段存储故障，作业置为失败");
        if job.status == ImportStatus::Validating {
            if let Err(e) = JobStateMachine::fail(job, cause.to_string()) {
                error!(job_id = %job.id, error = %e, "失败状态迁移被拒绝");
                return;
            }
        }
        if let Err(e) = self.jobs.save_job(job).await {
            error!(job_id = %job.id, error = %e, "失败状态持久化失败");
        }
    }

    fn sample(&self, sheet: &DecodedSheet) -> Vec<BTreeMap<String, CellValue>> {
        sheet
            .rows
            .iter()
            .take(self.config.sample_rows)
            .cloned()
            .collect()
    }

    // ==========================================
    // checkDuplicates(mapping, rows)
    // ==========================================

    /// 对给定行做重复检测（只读）
    #[instrument(skip(self, mapping, rows), fields(rows = rows.len()))]
    pub async fn check_duplicates(
        &self,
        business_id: &str,
        mapping: &ColumnMapping,
        rows: &[BTreeMap<String, CellValue>],
    ) -> ImportResult<DuplicateReport> {
        self.mapper.check_targets(mapping)?;
        let sheet = DecodedSheet {
            headers: mapping.keys().cloned().collect(),
            rows: rows.to_vec(),
        };
        let mapped = self.mapper.apply(&sheet, mapping);
        let scan = DuplicateDetector::detect(self.store.as_ref(), business_id, &mapped).await?;

        info!(
            business_id = %business_id,
            duplicates = scan.report.duplicate_count,
            unique = scan.report.unique_count,
            "重复检测完成"
        );
        Ok(scan.report)
    }

    /// 对作业暂存的行做重复检测（映射缺省时使用作业当前映射）
    pub async fn check_job_duplicates(
        &self,
        job_id: &str,
        mapping: Option<&ColumnMapping>,
    ) -> ImportResult<DuplicateReport> {
        let job = self.get_job(job_id).await?;
        let sheet = self.staged_rows(&job).await?;
        let mapping = mapping.unwrap_or(&job.column_mapping);
        self.check_duplicates(&job.business_id, mapping, &sheet.rows).await
    }

    async fn staged_rows(&self, job: &ImportJob) -> ImportResult<DecodedSheet> {
        self.jobs
            .load_staged_rows(&job.id)
            .await?
            .ok_or_else(|| ImportError::InternalError(format!("作业暂存行缺失: {}", job.id)))
    }

    // ==========================================
    // startProcessing(jobId, confirmedMapping, duplicateAction)
    // ==========================================

    /// 确认映射与重复策略，作业进入 processing 并在后台执行
    ///
    /// # 返回
    /// - Ok(job): 已进入 processing 的作业快照
    /// - Err(Conflict): 作业正被其他请求写入
    /// - Err(InvalidTransition): 作业不在 validated
    /// - Err(InvalidMapping / MissingRequiredMapping): 映射被拒绝，作业保持 validated
    #[instrument(skip(self, confirmed_mapping))]
    pub async fn start_processing(
        &self,
        job_id: &str,
        confirmed_mapping: Option<ColumnMapping>,
        duplicate_action: DuplicateAction,
    ) -> ImportResult<ImportJob> {
        let _claim = self.claim(job_id).await?;
        let mut job = self.get_job(job_id).await?;
        if job.status.is_busy() {
            return Err(ImportError::Conflict {
                job_id: job.id,
                status: job.status,
            });
        }
        if job.status != ImportStatus::Validated {
            return Err(ImportError::InvalidTransition {
                from: job.status,
                to: ImportStatus::Processing,
            });
        }

        // 1. 确认映射
        let mapping = confirmed_mapping.unwrap_or_else(|| job.column_mapping.clone());
        self.mapper.check_mapping(&mapping)?;

        // 2. 读取暂存行；映射变化时以确认映射重新校验
        let sheet = self.staged_rows(&job).await?;
        let mapped = self.mapper.apply(&sheet, &mapping);
        let outcome = self.validator.validate(&mapped);
        if mapping != job.column_mapping {
            info!(job_id = %job.id, "确认映射与建议映射不同，校验快照已按确认映射重算");
            job.errors = outcome.result.errors.clone();
            job.warnings = outcome.result.warnings.clone();
        }

        // 3. 重复预扫描
        let scan = DuplicateDetector::detect(self.store.as_ref(), &job.business_id, &mapped).await?;
        let tasks: Vec<RowTask> = outcome
            .rows
            .iter()
            .zip(&mapped)
            .map(|(validated, row)| RowTask::new(validated, row, scan.matches.get(&row.row).cloned()))
            .collect();

        // 4. 进入 processing
        job.column_mapping = mapping;
        job.duplicate_action = duplicate_action;
        JobStateMachine::transition(&mut job, ImportStatus::Processing)?;
        self.jobs.save_job(&job).await?;
        info!(
            job_id = %job.id,
            duplicate_action = %duplicate_action,
            rows = tasks.len(),
            duplicates = scan.report.duplicate_count,
            "开始执行导入"
        );

        // 5. 后台执行
        self.spawn_execution(job.clone(), tasks);
        Ok(job)
    }

    fn spawn_execution(&self, mut job: ImportJob, tasks: Vec<RowTask>) {
        let cancel = CancelSignal::new();
        let executor = ImportExecutor::new(
            self.store.clone(),
            self.jobs.clone(),
            self.config.max_parallel_rows,
        );
        let jobs = self.jobs.clone();
        let running = self.running.clone();
        let job_id = job.id.clone();
        let signal = cancel.clone();
        let (done_tx, done) = watch::channel(false);

        // 先登记再启动，避免任务结束时找不到自己的条目
        let mut registry = running.lock().unwrap_or_else(PoisonError::into_inner);
        tokio::spawn({
            let running = running.clone();
            async move {
                let started = Instant::now();
                let outcome = executor.run(&mut job, tasks, &signal).await;
                let transition = match &outcome {
                    ExecutionOutcome::Completed => {
                        JobStateMachine::transition(&mut job, ImportStatus::Completed)
                    }
                    ExecutionOutcome::Cancelled => {
                        JobStateMachine::transition(&mut job, ImportStatus::Cancelled)
                    }
                    ExecutionOutcome::Fatal(message) => JobStateMachine::fail(&mut job, message.clone()),
                };
                if let Err(e) = transition {
                    error!(job_id = %job.id, error = %e, "执行结束状态迁移失败");
                }
                if let Err(e) = jobs.save_job(&job).await {
                    error!(job_id = %job.id, error = %e, "执行结果持久化失败");
                }

                info!(
                    job_id = %job.id,
                    status = %job.status,
                    processed = job.processed_rows,
                    created = job.created_count,
                    updated = job.updated_count,
                    skipped = job.skipped_count,
                    failed = job.failed_count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "导入执行结束"
                );

                done_tx.send_replace(true);
                running
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&job.id);
            }
        });
        registry.insert(job_id, RunningJob { cancel, done });
    }

    // ==========================================
    // getJob / wait_for
    // ==========================================

    pub async fn get_job(&self, job_id: &str) -> ImportResult<ImportJob> {
        self.jobs
            .find_job(job_id)
            .await?
            .ok_or_else(|| ImportError::JobNotFound(job_id.to_string()))
    }

    /// 等待后台执行结束并返回最新作业（作业未在执行时直接返回）
    ///
    /// 可被多个调用方同时等待，每个调用方都在终态落库后返回
    pub async fn wait_for(&self, job_id: &str) -> ImportResult<ImportJob> {
        let done = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
            .map(|r| r.done.clone());
        if let Some(mut done) = done {
            // 发送端未置位即被丢弃：执行任务异常退出
            done.wait_for(|finished| *finished)
                .await
                .map_err(|_| ImportError::InternalError(format!("执行任务异常结束: {}", job_id)))?;
        }
        self.get_job(job_id).await
    }

    // ==========================================
    // cancel(jobId)
    // ==========================================

    /// 请求取消执行中的作业（协作式，终态由执行任务写入）
    ///
    /// 尽力而为：信号只在批次之间被检查。最后一批已完成、任务尚未注销时到达的信号
    /// 仍返回 Ok（processing 快照），但作业最终以 completed 结束。
    /// 调用方应以 get_job / wait_for 读到的终态为准。
    #[instrument(skip(self))]
    pub async fn cancel(&self, job_id: &str) -> ImportResult<ImportJob> {
        let job = self.get_job(job_id).await?;
        if job.status != ImportStatus::Processing {
            return Err(ImportError::InvalidTransition {
                from: job.status,
                to: ImportStatus::Cancelled,
            });
        }

        let signalled = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
            .map(|r| r.cancel.cancel())
            .is_some();
        if signalled {
            info!(job_id = %job_id, processed = job.processed_rows, "已发送取消信号");
            return Ok(job);
        }

        // 本进程没有对应的执行任务：任务已结束则状态已落库，否则作业是孤儿
        let mut job = self.get_job(job_id).await?;
        if job.status == ImportStatus::Processing {
            warn!(job_id = %job_id, "执行任务不存在，直接取消作业");
            JobStateMachine::transition(&mut job, ImportStatus::Cancelled)?;
            job.error_message = Some("执行任务已不存在".to_string());
            self.jobs.save_job(&job).await?;
        }
        Ok(job)
    }

    // ==========================================
    // rollback(jobId)
    // ==========================================

    /// 回滚作业已提交的行
    ///
    /// # 返回
    /// - Err(Conflict): 作业正在校验 / 执行 / 回滚
    /// - Err(InvalidTransition): 作业不在 completed / failed / cancelled
    /// - Err(NothingToRollback): 没有 created / updated 行
    #[instrument(skip(self))]
    pub async fn rollback(&self, job_id: &str) -> ImportResult<ImportJob> {
        let _claim = self.claim(job_id).await?;
        let mut job = self.get_job(job_id).await?;
        if job.status.is_busy() {
            return Err(ImportError::Conflict {
                job_id: job.id,
                status: job.status,
            });
        }
        if !job.status.can_transition_to(ImportStatus::RolledBack) {
            return Err(ImportError::InvalidTransition {
                from: job.status,
                to: ImportStatus::RolledBack,
            });
        }
        if job.committed_rows() == 0 {
            return Err(ImportError::NothingToRollback(job.id));
        }

        let report = RollbackManager::new(self.store.clone()).revert(&job).await;
        if let Some(message) = report.failure_message() {
            warn!(job_id = %job.id, failures = report.failures.len(), "部分回滚");
            job.error_message = Some(message);
        }
        JobStateMachine::transition(&mut job, ImportStatus::RolledBack)?;
        self.jobs.save_job(&job).await?;

        info!(
            job_id = %job.id,
            reverted = report.reverted,
            failures = report.failures.len(),
            "回滚完成"
        );
        Ok(job)
    }

    // ==========================================
    // listHistory(page, limit)
    // ==========================================

    /// 分页查询业务下的导入历史（created_at 倒序）
    ///
    /// # 参数
    /// - page: 从 1 开始
    /// - limit: 1..=history_max_limit
    pub async fn list_history(
        &self,
        business_id: &str,
        page: usize,
        limit: usize,
    ) -> ImportResult<ImportHistoryPage> {
        if page == 0 {
            return Err(ImportError::InvalidInput("page 从 1 开始".to_string()));
        }
        if limit == 0 || limit > self.config.history_max_limit {
            return Err(ImportError::InvalidInput(format!(
                "limit 必须在 1..={} 之间",
                self.config.history_max_limit
            )));
        }

        let offset = (page - 1).saturating_mul(limit);
        let (jobs, total) = self.jobs.list_jobs(business_id, offset, limit).await?;
        Ok(ImportHistoryPage {
            jobs,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        })
    }

    // ==========================================
    // 单写者占用
    // ==========================================

    async fn claim(&self, job_id: &str) -> ImportResult<JobClaim> {
        let inserted = self
            .claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id.to_string());
        if !inserted {
            let job = self.get_job(job_id).await?;
            return Err(ImportError::Conflict {
                job_id: job.id,
                status: job.status,
            });
        }
        Ok(JobClaim {
            claims: self.claims.clone(),
            job_id: job_id.to_string(),
        })
    }
}
