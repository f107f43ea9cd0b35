// ==========================================
// 商品目录导入引擎 - 引擎运行参数
// ==========================================

use crate::config::config_manager::{
    DEFAULT_FUZZY_MATCH_THRESHOLD, DEFAULT_HISTORY_MAX_LIMIT, DEFAULT_MAX_PARALLEL_ROWS,
    DEFAULT_SAMPLE_ROWS,
};
use crate::config::import_config_trait::ImportConfigReader;
use crate::repository::error::RepositoryResult;

/// 导入引擎运行参数（构造时一次性读取）
#[derive(Debug, Clone, PartialEq)]
pub struct ImportEngineConfig {
    pub fuzzy_match_threshold: f64,
    pub max_parallel_rows: usize,
    pub sample_rows: usize,
    pub history_max_limit: usize,
}

impl Default for ImportEngineConfig {
    fn default() -> Self {
        Self {
            fuzzy_match_threshold: DEFAULT_FUZZY_MATCH_THRESHOLD,
            max_parallel_rows: DEFAULT_MAX_PARALLEL_ROWS,
            sample_rows: DEFAULT_SAMPLE_ROWS,
            history_max_limit: DEFAULT_HISTORY_MAX_LIMIT,
        }
    }
}

impl ImportEngineConfig {
    /// 从配置读取器装配
    pub async fn load(reader: &dyn ImportConfigReader) -> RepositoryResult<Self> {
        Ok(Self {
            fuzzy_match_threshold: reader.get_fuzzy_match_threshold().await?,
            max_parallel_rows: reader.get_max_parallel_rows().await?,
            sample_rows: reader.get_sample_rows().await?,
            history_max_limit: reader.get_history_max_limit().await?,
        })
    }
}
