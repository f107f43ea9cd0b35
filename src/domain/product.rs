// ==========================================
// 商品目录导入引擎 - 商品领域模型
// ==========================================
// 职责: 商品记录 / 导入草稿 / 目标字段目录 / 原始单元格值
// 红线: 目录持久化由外部 CatalogStore 负责，本模块只定义数据形状
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 字段键常量（规范字段键，camelCase）
// ==========================================
pub mod field_keys {
    pub const NAME: &str = "name";
    pub const SKU: &str = "sku";
    pub const BARCODE: &str = "barcode";
    pub const DESCRIPTION: &str = "description";
    pub const CATEGORY: &str = "category";
    pub const UNIT: &str = "unit";
    pub const COST_PRICE: &str = "costPrice";
    pub const SELLING_PRICE: &str = "sellingPrice";
    pub const QUANTITY: &str = "quantity";
    pub const LOW_STOCK_ALERT: &str = "lowStockAlert";
}

// ==========================================
// FieldKind - 字段值类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Code,    // SKU / 条码：字母数字格式
    Price,   // 非负小数
    Integer, // 非负整数
}

// ==========================================
// FieldDef - 目标字段定义
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub key: String,
    pub label: String,
    pub required: bool,
    pub kind: FieldKind,
    pub max_len: Option<usize>,
}

impl FieldDef {
    fn new(key: &str, label: &str, required: bool, kind: FieldKind, max_len: Option<usize>) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            required,
            kind,
            max_len,
        }
    }
}

/// 商品目录的标准目标字段
pub fn product_field_catalog() -> Vec<FieldDef> {
    use field_keys::*;
    vec![
        FieldDef::new(NAME, "Product Name", true, FieldKind::Text, Some(255)),
        FieldDef::new(SKU, "SKU", false, FieldKind::Code, Some(64)),
        FieldDef::new(BARCODE, "Barcode", false, FieldKind::Code, Some(64)),
        FieldDef::new(DESCRIPTION, "Description", false, FieldKind::Text, None),
        FieldDef::new(CATEGORY, "Category", false, FieldKind::Text, Some(255)),
        FieldDef::new(UNIT, "Unit", false, FieldKind::Text, Some(32)),
        FieldDef::new(COST_PRICE, "Cost Price", false, FieldKind::Price, None),
        FieldDef::new(SELLING_PRICE, "Selling Price", true, FieldKind::Price, None),
        FieldDef::new(QUANTITY, "Quantity", false, FieldKind::Integer, None),
        FieldDef::new(LOW_STOCK_ALERT, "Low Stock Alert", false, FieldKind::Integer, None),
    ]
}

// ==========================================
// CellValue - 解码后的原始单元格值
// ==========================================
// 文件解码器可能给出字符串或数字（Excel 数值单元格）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    /// 统一转为去首尾空白的文本
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Number(n) => n.to_string(),
            CellValue::Text(s) => s.trim().to_string(),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Number(_) => false,
            CellValue::Text(s) => s.trim().is_empty(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_text())
    }
}

/// 名称匹配键：不区分大小写（完整 Unicode 小写折叠）
///
/// 数据库 name_key 列与内存索引都用这个函数生成，两侧折叠规则一致
pub fn name_key(name: &str) -> String {
    name.to_lowercase()
}

// ==========================================
// ProductFields - 商品可写字段全集
// ==========================================
// 用途: 新建载荷 / 覆盖载荷 / 回滚前像
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFields {
    pub name: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub cost_price: Option<f64>,
    pub selling_price: f64,
    pub quantity: i64,
    pub low_stock_alert: Option<i64>,
}

// ==========================================
// Product - 目录中的商品记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub business_id: String,
    #[serde(flatten)]
    pub fields: ProductFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==========================================
// ProductDraft - 校验通过的行数据（已类型转换）
// ==========================================
// 说明: 只有映射到且非空的字段为 Some；覆盖时仅改写这些字段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    pub name: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub cost_price: Option<f64>,
    pub selling_price: f64,
    pub quantity: Option<i64>,
    pub low_stock_alert: Option<i64>,
}

impl ProductDraft {
    /// 作为新记录插入时的完整字段
    pub fn to_new_fields(&self) -> ProductFields {
        ProductFields {
            name: self.name.clone(),
            sku: self.sku.clone(),
            barcode: self.barcode.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            unit: self.unit.clone(),
            cost_price: self.cost_price,
            selling_price: self.selling_price,
            quantity: self.quantity.unwrap_or(0),
            low_stock_alert: self.low_stock_alert,
        }
    }

    /// 覆盖已有记录：行内给出的字段改写，未给出的保留
    pub fn overlay(&self, existing: &ProductFields) -> ProductFields {
        ProductFields {
            name: self.name.clone(),
            sku: self.sku.clone().or_else(|| existing.sku.clone()),
            barcode: self.barcode.clone().or_else(|| existing.barcode.clone()),
            description: self
                .description
                .clone()
                .or_else(|| existing.description.clone()),
            category: self.category.clone().or_else(|| existing.category.clone()),
            unit: self.unit.clone().or_else(|| existing.unit.clone()),
            cost_price: self.cost_price.or(existing.cost_price),
            selling_price: self.selling_price,
            quantity: self.quantity.unwrap_or(existing.quantity),
            low_stock_alert: self.low_stock_alert.or(existing.low_stock_alert),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn existing() -> ProductFields {
        ProductFields {
            name: "Old".to_string(),
            sku: Some("SKU-1".to_string()),
            barcode: Some("4006381333931".to_string()),
            description: Some("keep me".to_string()),
            category: None,
            unit: Some("pcs".to_string()),
            cost_price: Some(1.5),
            selling_price: 3.0,
            quantity: 12,
            low_stock_alert: Some(2),
        }
    }

    #[test]
    fn test_name_key_folds_non_ascii() {
        assert_eq!(name_key("ÄPFEL"), name_key("äpfel"));
        assert_eq!(name_key("Blue Mug"), "blue mug");
    }

    #[test]
    fn test_overlay_keeps_unmapped_fields() {
        let draft = ProductDraft {
            name: "New".to_string(),
            selling_price: 4.25,
            quantity: Some(7),
            ..Default::default()
        };

        let merged = draft.overlay(&existing());

        assert_eq!(merged.name, "New");
        assert_eq!(merged.selling_price, 4.25);
        assert_eq!(merged.quantity, 7);
        assert_eq!(merged.description, Some("keep me".to_string()));
        assert_eq!(merged.sku, Some("SKU-1".to_string()));
        assert_eq!(merged.cost_price, Some(1.5));
    }

    #[test]
    fn test_new_fields_default_quantity() {
        let draft = ProductDraft {
            name: "Widget".to_string(),
            selling_price: 9.99,
            ..Default::default()
        };

        assert_eq!(draft.to_new_fields().quantity, 0);
    }

    #[test]
    fn test_cell_value_text() {
        assert_eq!(CellValue::Number(5.0).as_text(), "5");
        assert_eq!(CellValue::Number(9.99).as_text(), "9.99");
        assert_eq!(CellValue::from("  abc ").as_text(), "abc");
        assert!(CellValue::from("   ").is_blank());
    }

    #[test]
    fn test_field_catalog_required() {
        let required: Vec<String> = product_field_catalog()
            .into_iter()
            .filter(|f| f.required)
            .map(|f| f.key)
            .collect();
        assert_eq!(required, vec!["name".to_string(), "sellingPrice".to_string()]);
    }
}
