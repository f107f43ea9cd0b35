// ==========================================
// 商品目录导入引擎 - 列映射器
// ==========================================
// 职责: 上传表头 → 规范字段键
// 优先级: (a) 大小写不敏感的标签/键精确匹配
//         (b) 固定别名字典
//         (c) Jaro-Winkler 相似度 ≥ 阈值
// 约束: 每个字段最多被一个表头占用；未命中的表头保持未映射
// ==========================================

use crate::domain::import_job::{ColumnMapping, DecodedSheet, MappedRow};
use crate::domain::product::FieldDef;
use crate::importer::error::{ImportError, ImportResult};
use rapidfuzz::distance::jaro_winkler;
use std::collections::{BTreeMap, HashSet};

// 字段键 → 常见表头别名（已规范化：小写、单空格）
const ALIASES: &[(&str, &[&str])] = &[
    (
        "name",
        &["product", "product name", "item", "item name", "title", "name"],
    ),
    (
        "sku",
        &["sku", "sku code", "product code", "item code", "code", "article", "article number"],
    ),
    ("barcode", &["barcode", "bar code", "ean", "ean13", "upc", "gtin"]),
    ("description", &["description", "desc", "details", "product description"]),
    ("category", &["category", "category name", "group", "product group", "type"]),
    ("unit", &["unit", "uom", "unit of measure", "measure"]),
    (
        "costPrice",
        &["cost", "cost price", "purchase price", "buying price", "buy price"],
    ),
    (
        "sellingPrice",
        &["price", "selling price", "sale price", "retail price", "unit price", "sell price"],
    ),
    (
        "quantity",
        &["qty", "quantity", "stock", "stock quantity", "on hand", "inventory"],
    ),
    (
        "lowStockAlert",
        &["low stock", "low stock alert", "reorder level", "min stock", "minimum stock"],
    ),
];

/// 表头规范化：去空白、小写、分隔符统一为单空格、拆开 camelCase
pub fn normalize_header(raw: &str) -> String {
    let mut spaced = String::with_capacity(raw.len() + 4);
    let mut prev_lower = false;
    for ch in raw.trim().chars() {
        if ch.is_uppercase() && prev_lower {
            spaced.push(' ');
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        if matches!(ch, '_' | '-' | '.' | '/' | '(' | ')') {
            spaced.push(' ');
        } else {
            spaced.push(ch);
        }
    }
    spaced
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct ColumnMapper {
    fields: Vec<FieldDef>,
    fuzzy_threshold: f64,
}

impl ColumnMapper {
    pub fn new(fields: Vec<FieldDef>, fuzzy_threshold: f64) -> Self {
        Self {
            fields,
            fuzzy_threshold,
        }
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// 计算建议映射
    ///
    /// 按优先级逐轮扫描全部表头；同一轮内按表头顺序占用字段，结果确定
    pub fn suggest(&self, headers: &[String]) -> ColumnMapping {
        let mut mapping = ColumnMapping::new();
        let mut taken: HashSet<String> = HashSet::new();
        let normalized: Vec<(String, String)> = headers
            .iter()
            .filter(|h| !h.trim().is_empty())
            .map(|h| (h.clone(), normalize_header(h)))
            .collect();

        // (a) 标签 / 键精确匹配
        for (header, norm) in &normalized {
            if mapping.contains_key(header) {
                continue;
            }
            let hit = self.fields.iter().find(|f| {
                !taken.contains(&f.key)
                    && (normalize_header(&f.label) == *norm || normalize_header(&f.key) == *norm)
            });
            if let Some(field) = hit {
                taken.insert(field.key.clone());
                mapping.insert(header.clone(), field.key.clone());
            }
        }

        // (b) 别名字典
        for (header, norm) in &normalized {
            if mapping.contains_key(header) {
                continue;
            }
            let hit = ALIASES.iter().find(|(key, aliases)| {
                !taken.contains(*key)
                    && self.fields.iter().any(|f| f.key == *key)
                    && aliases.contains(&norm.as_str())
            });
            if let Some((key, _)) = hit {
                taken.insert(key.to_string());
                mapping.insert(header.clone(), key.to_string());
            }
        }

        // (c) 模糊相似度：取最高分，平分时按字段目录顺序
        for (header, norm) in &normalized {
            if mapping.contains_key(header) {
                continue;
            }
            let mut best: Option<(&FieldDef, f64)> = None;
            for field in self.fields.iter().filter(|f| !taken.contains(&f.key)) {
                let score = self.field_similarity(field, norm);
                if score >= self.fuzzy_threshold && best.map_or(true, |(_, s)| score > s) {
                    best = Some((field, score));
                }
            }
            if let Some((field, _)) = best {
                taken.insert(field.key.clone());
                mapping.insert(header.clone(), field.key.clone());
            }
        }

        mapping
    }

    /// 表头与字段（标签 / 键 / 别名）的最高相似度
    fn field_similarity(&self, field: &FieldDef, norm_header: &str) -> f64 {
        let mut candidates = vec![normalize_header(&field.label), normalize_header(&field.key)];
        if let Some((_, aliases)) = ALIASES.iter().find(|(key, _)| *key == field.key) {
            candidates.extend(aliases.iter().map(|a| a.to_string()));
        }
        candidates
            .iter()
            .map(|c| jaro_winkler::similarity(norm_header.chars(), c.chars()))
            .fold(0.0, f64::max)
    }

    /// 校验确认后的映射
    ///
    /// # 返回
    /// - Err(InvalidMapping): 目标字段未知，或两个表头映射到同一字段
    /// - Err(MissingRequiredMapping): 必填字段没有对应表头（列出全部缺失字段）
    pub fn check_mapping(&self, mapping: &ColumnMapping) -> ImportResult<()> {
        let seen = self.check_targets(mapping)?;

        let missing: Vec<String> = self
            .fields
            .iter()
            .filter(|f| f.required && !seen.contains_key(f.key.as_str()))
            .map(|f| f.key.clone())
            .collect();
        if !missing.is_empty() {
            return Err(ImportError::MissingRequiredMapping(missing));
        }
        Ok(())
    }

    /// 只校验映射目标（已知字段、一对一），返回 字段键 → 表头
    pub fn check_targets<'a>(
        &self,
        mapping: &'a ColumnMapping,
    ) -> ImportResult<BTreeMap<&'a str, &'a str>> {
        let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
        for (header, key) in mapping {
            if !self.fields.iter().any(|f| &f.key == key) {
                return Err(ImportError::InvalidMapping(format!(
                    "表头 '{}' 映射到未知字段 '{}'",
                    header, key
                )));
            }
            if let Some(first) = seen.insert(key.as_str(), header.as_str()) {
                return Err(ImportError::InvalidMapping(format!(
                    "字段 '{}' 同时被表头 '{}' 和 '{}' 映射",
                    key, first, header
                )));
            }
        }
        Ok(seen)
    }

    /// 按映射把表头行转换为规范字段行（未映射列丢弃）
    pub fn apply(&self, sheet: &DecodedSheet, mapping: &ColumnMapping) -> Vec<MappedRow> {
        sheet
            .rows
            .iter()
            .enumerate()
            .map(|(idx, raw)| {
                let values = raw
                    .iter()
                    .filter_map(|(header, value)| {
                        mapping.get(header).map(|key| (key.clone(), value.clone()))
                    })
                    .collect();
                MappedRow {
                    row: idx + 1,
                    values,
                }
            })
            .collect()
    }
}
