// ==========================================
// 商品目录导入引擎 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入引擎所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 获取表头模糊匹配阈值（Jaro-Winkler 相似度）
    ///
    /// # 默认值
    /// - 0.85
    async fn get_fuzzy_match_threshold(&self) -> RepositoryResult<f64>;

    /// 获取执行阶段的最大并行行数
    ///
    /// # 默认值
    /// - 1（串行，逐行持久化进度）
    ///
    /// # 约束
    /// - 取值范围 [1, 32]
    async fn get_max_parallel_rows(&self) -> RepositoryResult<usize>;

    /// 获取 validate 返回的样例行数
    ///
    /// # 默认值
    /// - 5
    async fn get_sample_rows(&self) -> RepositoryResult<usize>;

    /// 获取历史列表单页上限
    ///
    /// # 默认值
    /// - 100
    async fn get_history_max_limit(&self) -> RepositoryResult<usize>;
}
