// ==========================================
// 商品目录导入引擎 - 重复检测器
// ==========================================
// 职责: 行 × 业务范围内的已有目录 → DuplicateInfo
// 优先级: SKU 精确 > 条码精确 > 名称（大小写不敏感）精确，每行至多一个命中
// 红线: 只读；不修改目录，也不改动作业计数
// 确定性: 索引先整体构建再逐行查询，命中与行的评估顺序无关
// ==========================================

use crate::domain::import_job::{DuplicateInfo, DuplicateReport, MappedRow};
use crate::domain::product::{field_keys, name_key, Product};
use crate::domain::types::MatchField;
use crate::repository::catalog_repo::{CandidateKeys, CatalogStore};
use crate::repository::error::RepositoryResult;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

// ==========================================
// CatalogIndex - 已有记录索引
// ==========================================
// 同一键命中多条记录时保留最早创建的一条（候选已按 created_at, id 排序）
#[derive(Debug, Clone, Default)]
pub struct CatalogIndex {
    by_sku: HashMap<String, Product>,
    by_barcode: HashMap<String, Product>,
    by_name: HashMap<String, Product>,
}

impl CatalogIndex {
    pub fn from_products(products: Vec<Product>) -> Self {
        let mut index = Self::default();
        for product in products {
            if let Some(sku) = &product.fields.sku {
                index
                    .by_sku
                    .entry(sku.clone())
                    .or_insert_with(|| product.clone());
            }
            if let Some(barcode) = &product.fields.barcode {
                index
                    .by_barcode
                    .entry(barcode.clone())
                    .or_insert_with(|| product.clone());
            }
            index
                .by_name
                .entry(name_key(&product.fields.name))
                .or_insert(product);
        }
        index
    }

    pub fn is_empty(&self) -> bool {
        self.by_sku.is_empty() && self.by_barcode.is_empty() && self.by_name.is_empty()
    }

    /// 按优先级查找单行命中
    pub fn match_row(&self, row: &MappedRow) -> Option<DuplicateInfo> {
        self.match_values(
            row.row,
            row.text(field_keys::SKU),
            row.text(field_keys::BARCODE),
            row.text(field_keys::NAME),
        )
    }

    pub fn match_values(
        &self,
        row: usize,
        sku: Option<String>,
        barcode: Option<String>,
        name: Option<String>,
    ) -> Option<DuplicateInfo> {
        let lookups = [
            (MatchField::Sku, sku, &self.by_sku, false),
            (MatchField::Barcode, barcode, &self.by_barcode, false),
            (MatchField::Name, name, &self.by_name, true),
        ];

        lookups.into_iter().find_map(|(field, value, map, fold_case)| {
            let value = value?;
            let key = if fold_case { name_key(&value) } else { value.clone() };
            map.get(&key).map(|existing| DuplicateInfo {
                row,
                field,
                value,
                existing_product_id: existing.id.clone(),
                existing_product_name: existing.fields.name.clone(),
            })
        })
    }
}

/// 汇总所有行的候选键（去重、排序）
pub fn candidate_keys(rows: &[MappedRow]) -> CandidateKeys {
    let mut skus = BTreeSet::new();
    let mut barcodes = BTreeSet::new();
    let mut names = BTreeSet::new();
    for row in rows {
        if let Some(sku) = row.text(field_keys::SKU) {
            skus.insert(sku);
        }
        if let Some(barcode) = row.text(field_keys::BARCODE) {
            barcodes.insert(barcode);
        }
        if let Some(name) = row.text(field_keys::NAME) {
            names.insert(name_key(&name));
        }
    }
    CandidateKeys {
        skus: skus.into_iter().collect(),
        barcodes: barcodes.into_iter().collect(),
        names: names.into_iter().collect(),
    }
}

/// 检测结果：对外报告 + 行号 → 命中（执行阶段使用）
#[derive(Debug, Clone, Default)]
pub struct DuplicateScan {
    pub report: DuplicateReport,
    pub matches: HashMap<usize, DuplicateInfo>,
}

pub struct DuplicateDetector;

impl DuplicateDetector {
    /// 构建业务范围内的候选索引
    pub async fn build_index(
        store: &dyn CatalogStore,
        business_id: &str,
        rows: &[MappedRow],
    ) -> RepositoryResult<CatalogIndex> {
        let keys = candidate_keys(rows);
        if keys.is_empty() {
            return Ok(CatalogIndex::default());
        }
        let products = store.find_candidates(business_id, &keys).await?;
        debug!(
            business_id = %business_id,
            candidates = products.len(),
            "重复检测候选记录已加载"
        );
        Ok(CatalogIndex::from_products(products))
    }

    /// 对已构建的索引逐行匹配
    pub fn scan(index: &CatalogIndex, rows: &[MappedRow]) -> DuplicateScan {
        let mut duplicates: Vec<DuplicateInfo> =
            rows.iter().filter_map(|row| index.match_row(row)).collect();
        duplicates.sort_by_key(|d| d.row);

        let matches = duplicates.iter().map(|d| (d.row, d.clone())).collect();
        DuplicateScan {
            report: DuplicateReport {
                total_rows: rows.len(),
                duplicate_count: duplicates.len(),
                unique_count: rows.len() - duplicates.len(),
                duplicates,
            },
            matches,
        }
    }

    pub async fn detect(
        store: &dyn CatalogStore,
        business_id: &str,
        rows: &[MappedRow],
    ) -> RepositoryResult<DuplicateScan> {
        let index = Self::build_index(store, business_id, rows).await?;
        Ok(Self::scan(&index, rows))
    }
}
