// ==========================================
// 商品目录导入引擎 - 导入作业 Repository Trait
// ==========================================
// 职责: 定义导入作业持久化接口（不包含实现）
// 红线: Repository 不含业务逻辑，状态迁移合法性由引擎保证
// ==========================================

use crate::domain::import_job::{DecodedSheet, ImportJob};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// ImportJobRepository Trait
// ==========================================
// 用途: 导入作业记录 + 暂存的解码行
// 实现者: ImportJobRepositoryImpl（使用 rusqlite）
#[async_trait]
pub trait ImportJobRepository: Send + Sync {
    /// 插入新作业
    async fn insert_job(&self, job: &ImportJob) -> RepositoryResult<()>;

    /// 整体保存作业（状态、计数、JSON 列）
    ///
    /// # 返回
    /// - Err(NotFound): 作业不存在
    async fn save_job(&self, job: &ImportJob) -> RepositoryResult<()>;

    /// 按 ID 查询作业
    async fn find_job(&self, job_id: &str) -> RepositoryResult<Option<ImportJob>>;

    /// 分页查询业务下的历史作业（created_at 倒序）
    ///
    /// # 参数
    /// - offset / limit: 已由调用方校验
    ///
    /// # 返回
    /// - (当前页作业, 总数)
    async fn list_jobs(
        &self,
        business_id: &str,
        offset: usize,
        limit: usize,
    ) -> RepositoryResult<(Vec<ImportJob>, usize)>;

    /// 暂存解码后的行（执行阶段再读取）
    async fn save_staged_rows(&self, job_id: &str, sheet: &DecodedSheet) -> RepositoryResult<()>;

    /// 读取暂存行
    async fn load_staged_rows(&self, job_id: &str) -> RepositoryResult<Option<DecodedSheet>>;
}
