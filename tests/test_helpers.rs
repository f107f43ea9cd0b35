// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、引擎装配、测试文件生成、故障注入 Store / 作业仓储
// ==========================================

#![allow(dead_code)]

use async_trait::async_trait;
use catalog_import::config::ImportEngineConfig;
use catalog_import::db::open_sqlite_connection;
use catalog_import::domain::{DecodedSheet, ImportJob, Product, ProductFields, UploadedFile};
use catalog_import::importer::ImportEngine;
use catalog_import::repository::{
    CandidateKeys, CatalogStore, ImportJobRepository, ImportJobRepositoryImpl,
    ProductCatalogRepository, RepositoryError, RepositoryResult,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

pub const BIZ: &str = "biz-001";

/// 测试环境（TempDir 需保持存活）
pub struct TestEnv {
    _dir: TempDir,
    pub db_path: String,
    pub catalog: Arc<ProductCatalogRepository>,
    pub jobs: Arc<ImportJobRepositoryImpl>,
}

/// 创建临时测试数据库（目录与作业仓储共享同一连接）
pub fn create_test_env() -> TestEnv {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let db_path = dir.path().join("catalog.db").to_string_lossy().to_string();
    let conn = open_sqlite_connection(&db_path).expect("打开数据库失败");
    let conn = Arc::new(Mutex::new(conn));

    let catalog = ProductCatalogRepository::from_connection(conn.clone()).expect("创建目录仓储失败");
    let jobs = ImportJobRepositoryImpl::from_connection(conn).expect("创建作业仓储失败");

    TestEnv {
        _dir: dir,
        db_path,
        catalog: Arc::new(catalog),
        jobs: Arc::new(jobs),
    }
}

impl TestEnv {
    /// 默认配置的引擎
    pub fn engine(&self) -> ImportEngine {
        self.engine_with(ImportEngineConfig::default())
    }

    pub fn engine_with(&self, config: ImportEngineConfig) -> ImportEngine {
        ImportEngine::new(self.catalog.clone(), self.jobs.clone(), config)
    }

    /// 使用包装后的 Store（故障注入）
    pub fn engine_with_store(
        &self,
        store: Arc<dyn CatalogStore>,
        config: ImportEngineConfig,
    ) -> ImportEngine {
        ImportEngine::new(store, self.jobs.clone(), config)
    }

    /// 使用包装后的作业仓储（故障注入）
    pub fn engine_with_jobs(&self, jobs: Arc<dyn ImportJobRepository>) -> ImportEngine {
        ImportEngine::new(self.catalog.clone(), jobs, ImportEngineConfig::default())
    }

    pub fn product_count(&self) -> usize {
        self.catalog.count_products(BIZ).expect("统计商品失败")
    }

    pub async fn seed_product(&self, name: &str, sku: Option<&str>, price: f64, qty: i64) -> Product {
        self.catalog
            .create_product(BIZ, &fields(name, sku, price, qty))
            .await
            .expect("写入种子商品失败")
    }

    pub async fn product(&self, id: &str) -> Option<Product> {
        self.catalog.get_product(id).await.expect("查询商品失败")
    }
}

pub fn fields(name: &str, sku: Option<&str>, price: f64, qty: i64) -> ProductFields {
    ProductFields {
        name: name.to_string(),
        sku: sku.map(str::to_string),
        barcode: None,
        description: Some(format!("{} 原始描述", name)),
        category: Some("default".to_string()),
        unit: Some("pcs".to_string()),
        cost_price: Some(price / 2.0),
        selling_price: price,
        quantity: qty,
        low_stock_alert: Some(1),
    }
}

/// 默认配置，执行并行度可调
pub fn config_with_parallel(max_parallel_rows: usize) -> ImportEngineConfig {
    ImportEngineConfig {
        max_parallel_rows,
        ..ImportEngineConfig::default()
    }
}

// ==========================================
// 测试文件生成
// ==========================================

pub fn csv_file(content: &str) -> UploadedFile {
    UploadedFile::new("products.csv", "text/csv", content.as_bytes().to_vec())
}

/// 生成 N 行 "Product,SKU,Price,Qty" 文件（SKU-1 .. SKU-N）
pub fn generated_csv(rows: usize) -> UploadedFile {
    let mut content = String::from("Product,SKU,Price,Qty\n");
    for i in 1..=rows {
        content.push_str(&format!("Item {},SKU-{},{}.50,{}\n", i, i, i, i));
    }
    csv_file(&content)
}

/// 校验 + 执行 + 等待结束
pub async fn import_and_wait(engine: &ImportEngine, file: &UploadedFile, action: &str) -> ImportJob {
    let validation = engine.validate(BIZ, file).await.expect("校验失败");
    let action = catalog_import::DuplicateAction::parse(action).expect("未知策略");
    engine
        .start_processing(&validation.job_id, None, action)
        .await
        .expect("启动执行失败");
    engine.wait_for(&validation.job_id).await.expect("等待执行失败")
}

// ==========================================
// FaultyStore - 故障注入 Store
// ==========================================
// - fatal_on_create: 第 N 次 create 起返回连接错误（致命）
// - reject_name: 指定名称的 create 返回行级错误
// - gate: 第 N 次 create 完成后通知测试并等待放行
// - slow_reads: get_product 读到结果后再挂起一段时间
pub struct FaultyStore {
    inner: Arc<dyn CatalogStore>,
    creates: AtomicUsize,
    fatal_on_create: Option<usize>,
    reject_name: Option<String>,
    gate: Option<Gate>,
    read_delay: Option<Duration>,
}

#[derive(Clone)]
pub struct Gate {
    pub at: usize,
    pub reached: Arc<Notify>,
    pub resume: Arc<Notify>,
}

impl Gate {
    pub fn new(at: usize) -> Self {
        Self {
            at,
            reached: Arc::new(Notify::new()),
            resume: Arc::new(Notify::new()),
        }
    }
}

impl FaultyStore {
    pub fn wrap(inner: Arc<dyn CatalogStore>) -> Self {
        Self {
            inner,
            creates: AtomicUsize::new(0),
            fatal_on_create: None,
            reject_name: None,
            gate: None,
            read_delay: None,
        }
    }

    pub fn fatal_on_create(mut self, n: usize) -> Self {
        self.fatal_on_create = Some(n);
        self
    }

    pub fn reject_name(mut self, name: &str) -> Self {
        self.reject_name = Some(name.to_string());
        self
    }

    pub fn gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn slow_reads(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogStore for FaultyStore {
    async fn get_product(&self, id: &str) -> RepositoryResult<Option<Product>> {
        let product = self.inner.get_product(id).await;
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        product
    }

    async fn find_candidates(
        &self,
        business_id: &str,
        keys: &CandidateKeys,
    ) -> RepositoryResult<Vec<Product>> {
        self.inner.find_candidates(business_id, keys).await
    }

    async fn create_product(
        &self,
        business_id: &str,
        fields: &ProductFields,
    ) -> RepositoryResult<Product> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;

        if self.fatal_on_create.map_or(false, |at| n >= at) {
            return Err(RepositoryError::DatabaseConnectionError(
                "catalog store unreachable".to_string(),
            ));
        }
        if self.reject_name.as_deref() == Some(fields.name.as_str()) {
            return Err(RepositoryError::FieldValueError {
                field: "name".to_string(),
                message: "rejected by store".to_string(),
            });
        }

        let created = self.inner.create_product(business_id, fields).await;
        if let Some(gate) = self.gate.as_ref().filter(|g| g.at == n) {
            gate.reached.notify_one();
            gate.resume.notified().await;
        }
        created
    }

    async fn update_product(&self, id: &str, fields: &ProductFields) -> RepositoryResult<Product> {
        self.inner.update_product(id, fields).await
    }

    async fn delete_product(&self, id: &str) -> RepositoryResult<()> {
        self.inner.delete_product(id).await
    }
}

// ==========================================
// FaultyJobs - 故障注入作业仓储
// ==========================================
// - fail_staging: save_staged_rows 返回查询错误
pub struct FaultyJobs {
    inner: Arc<dyn ImportJobRepository>,
    fail_staging: bool,
}

impl FaultyJobs {
    pub fn wrap(inner: Arc<dyn ImportJobRepository>) -> Self {
        Self {
            inner,
            fail_staging: false,
        }
    }

    pub fn fail_staging(mut self) -> Self {
        self.fail_staging = true;
        self
    }
}

#[async_trait]
impl ImportJobRepository for FaultyJobs {
    async fn insert_job(&self, job: &ImportJob) -> RepositoryResult<()> {
        self.inner.insert_job(job).await
    }

    async fn save_job(&self, job: &ImportJob) -> RepositoryResult<()> {
        self.inner.save_job(job).await
    }

    async fn find_job(&self, job_id: &str) -> RepositoryResult<Option<ImportJob>> {
        self.inner.find_job(job_id).await
    }

    async fn list_jobs(
        &self,
        business_id: &str,
        offset: usize,
        limit: usize,
    ) -> RepositoryResult<(Vec<ImportJob>, usize)> {
        self.inner.list_jobs(business_id, offset, limit).await
    }

    async fn save_staged_rows(&self, job_id: &str, sheet: &DecodedSheet) -> RepositoryResult<()> {
        if self.fail_staging {
            return Err(RepositoryError::DatabaseQueryError("disk full".to_string()));
        }
        self.inner.save_staged_rows(job_id, sheet).await
    }

    async fn load_staged_rows(&self, job_id: &str) -> RepositoryResult<Option<DecodedSheet>> {
        self.inner.load_staged_rows(job_id).await
    }
}
