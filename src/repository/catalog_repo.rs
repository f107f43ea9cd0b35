// ==========================================
// 商品目录导入引擎 - 商品目录 Store Trait
// ==========================================
// 职责: 定义导入引擎消费的目录读写接口（不包含实现）
// 红线: Store 不含业务规则，只做数据 CRUD
// ==========================================

use crate::domain::product::{Product, ProductFields};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// CandidateKeys - 重复检测候选键
// ==========================================
// 名称按大小写不敏感比较，SKU / 条码精确比较
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateKeys {
    pub skus: Vec<String>,
    pub barcodes: Vec<String>,
    pub names: Vec<String>,
}

impl CandidateKeys {
    pub fn is_empty(&self) -> bool {
        self.skus.is_empty() && self.barcodes.is_empty() && self.names.is_empty()
    }
}

// ==========================================
// CatalogStore Trait
// ==========================================
// 用途: 导入执行/回滚/重复检测所需的目录访问
// 实现者: ProductCatalogRepository（使用 rusqlite）
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// 按 ID 查询商品
    async fn get_product(&self, id: &str) -> RepositoryResult<Option<Product>>;

    /// 查询业务范围内 SKU / 条码 / 名称命中任一候选键的商品
    ///
    /// # 返回
    /// - 按 created_at, id 升序（用于确定性的首个命中）
    async fn find_candidates(
        &self,
        business_id: &str,
        keys: &CandidateKeys,
    ) -> RepositoryResult<Vec<Product>>;

    /// 新建商品
    async fn create_product(
        &self,
        business_id: &str,
        fields: &ProductFields,
    ) -> RepositoryResult<Product>;

    /// 覆盖商品字段
    ///
    /// # 返回
    /// - Err(NotFound): 记录不存在
    async fn update_product(&self, id: &str, fields: &ProductFields) -> RepositoryResult<Product>;

    /// 删除商品
    ///
    /// # 返回
    /// - Err(NotFound): 记录不存在
    async fn delete_product(&self, id: &str) -> RepositoryResult<()>;
}
