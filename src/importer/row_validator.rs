// ==========================================
// 商品目录导入引擎 - 行校验器
// ==========================================
// 职责: 逐行逐字段穷举校验（不短路），产出完整缺陷清单
// 规则: 必填非空 / 价格非负小数 / 数量非负整数 / SKU 与条码字母数字
// 警告: 文件内重复 SKU / 条码；成本价高于售价
// 红线: 纯函数，不访问目录；相同输入得到逐字节相同的结果
// ==========================================

use crate::domain::import_job::{ImportRowError, MappedRow, ValidationResult};
use crate::domain::product::{field_keys, CellValue, FieldDef, FieldKind, ProductDraft};
use std::collections::HashMap;

// ==========================================
// ValidatedRow - 单行校验结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRow {
    pub row: usize,
    /// 仅当该行无错误时为 Some
    pub draft: Option<ProductDraft>,
    pub errors: Vec<ImportRowError>,
}

impl ValidatedRow {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// 失败行的错误摘要（写入 ImportRowResult.error）
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// 校验阶段的完整产物：快照 + 行级明细（执行阶段使用）
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub result: ValidationResult,
    pub rows: Vec<ValidatedRow>,
}

pub struct RowValidator {
    fields: Vec<FieldDef>,
}

impl RowValidator {
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self { fields }
    }

    /// 校验全部行
    ///
    /// # 参数
    /// - rows: 已按确认映射转换的行（文件顺序）
    pub fn validate(&self, rows: &[MappedRow]) -> ValidationOutcome {
        let mut validated = Vec::with_capacity(rows.len());
        let mut errors = Vec::new();

        for mapped in rows {
            let checked = self.validate_row(mapped);
            errors.extend(checked.errors.iter().cloned());
            validated.push(checked);
        }

        let mut warnings = repeated_key_warnings(rows, field_keys::SKU);
        warnings.extend(repeated_key_warnings(rows, field_keys::BARCODE));
        warnings.extend(
            validated
                .iter()
                .filter_map(|r| r.draft.as_ref().map(|d| (r.row, d)))
                .filter_map(|(row, draft)| price_inversion_warning(row, draft)),
        );
        warnings.sort_by(|a, b| a.row.cmp(&b.row).then_with(|| a.field.cmp(&b.field)));

        let valid_rows = validated.iter().filter(|r| r.is_valid()).count();
        ValidationOutcome {
            result: ValidationResult {
                is_valid: errors.is_empty(),
                errors,
                warnings,
                valid_rows,
                total_rows: rows.len(),
            },
            rows: validated,
        }
    }

    /// 单行穷举校验：每个字段都检查，错误全部收集
    pub fn validate_row(&self, mapped: &MappedRow) -> ValidatedRow {
        let mut errors = Vec::new();
        let mut draft = ProductDraft::default();

        for field in &self.fields {
            let raw = mapped.values.get(&field.key).filter(|v| !v.is_blank());
            let Some(raw) = raw else {
                if field.required {
                    errors.push(ImportRowError::new(
                        mapped.row,
                        &field.key,
                        format!("{} 为必填项", field.label),
                        None,
                    ));
                }
                continue;
            };

            match check_field(field, raw) {
                Ok(value) => apply_to_draft(&mut draft, &field.key, value),
                Err(message) => errors.push(ImportRowError::new(
                    mapped.row,
                    &field.key,
                    message,
                    Some(raw.as_text()),
                )),
            }
        }

        ValidatedRow {
            row: mapped.row,
            draft: if errors.is_empty() { Some(draft) } else { None },
            errors,
        }
    }
}

// ==========================================
// 字段级检查
// ==========================================

enum FieldValue {
    Text(String),
    Price(f64),
    Integer(i64),
}

fn check_field(field: &FieldDef, raw: &CellValue) -> Result<FieldValue, String> {
    match field.kind {
        FieldKind::Text => {
            let text = raw.as_text();
            check_length(field, &text)?;
            Ok(FieldValue::Text(text))
        }
        FieldKind::Code => {
            let text = raw.as_text();
            check_length(field, &text)?;
            check_code_format(&field.key, &text)?;
            Ok(FieldValue::Text(text))
        }
        FieldKind::Price => parse_price(raw).map(FieldValue::Price),
        FieldKind::Integer => parse_non_negative_int(raw).map(FieldValue::Integer),
    }
}

fn check_length(field: &FieldDef, text: &str) -> Result<(), String> {
    match field.max_len {
        Some(max) if text.chars().count() > max => {
            Err(format!("{} 长度超过 {} 个字符", field.label, max))
        }
        _ => Ok(()),
    }
}

/// SKU: 字母数字加 '-' / '_'；条码: 纯字母数字
fn check_code_format(key: &str, text: &str) -> Result<(), String> {
    let ok = if key == field_keys::BARCODE {
        text.chars().all(|c| c.is_ascii_alphanumeric())
    } else {
        text.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    };
    if ok {
        Ok(())
    } else if key == field_keys::BARCODE {
        Err("条码只能包含字母和数字".to_string())
    } else {
        Err("SKU 只能包含字母、数字、'-' 和 '_'".to_string())
    }
}

/// 非负有限小数
fn parse_price(raw: &CellValue) -> Result<f64, String> {
    let value = match raw {
        CellValue::Number(n) => *n,
        CellValue::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{}' 不是有效的价格", s.trim()))?,
    };
    if !value.is_finite() {
        return Err("价格必须是有限数值".to_string());
    }
    if value < 0.0 {
        return Err("价格不能为负数".to_string());
    }
    Ok(value)
}

/// 非负整数（接受 "5" / "5.0" / Excel 数值 5.0）
fn parse_non_negative_int(raw: &CellValue) -> Result<i64, String> {
    let value = match raw {
        CellValue::Number(n) => *n,
        CellValue::Text(s) => {
            let text = s.trim();
            match text.parse::<i64>() {
                Ok(v) => v as f64,
                Err(_) => text
                    .parse::<f64>()
                    .map_err(|_| format!("'{}' 不是有效的整数", text))?,
            }
        }
    };
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(format!("'{}' 不是有效的整数", raw.as_text()));
    }
    if value < 0.0 {
        return Err("数值不能为负数".to_string());
    }
    if value > i64::MAX as f64 {
        return Err("数值超出范围".to_string());
    }
    Ok(value as i64)
}

fn apply_to_draft(draft: &mut ProductDraft, key: &str, value: FieldValue) {
    match (key, value) {
        (field_keys::NAME, FieldValue::Text(v)) => draft.name = v,
        (field_keys::SKU, FieldValue::Text(v)) => draft.sku = Some(v),
        (field_keys::BARCODE, FieldValue::Text(v)) => draft.barcode = Some(v),
        (field_keys::DESCRIPTION, FieldValue::Text(v)) => draft.description = Some(v),
        (field_keys::CATEGORY, FieldValue::Text(v)) => draft.category = Some(v),
        (field_keys::UNIT, FieldValue::Text(v)) => draft.unit = Some(v),
        (field_keys::COST_PRICE, FieldValue::Price(v)) => draft.cost_price = Some(v),
        (field_keys::SELLING_PRICE, FieldValue::Price(v)) => draft.selling_price = v,
        (field_keys::QUANTITY, FieldValue::Integer(v)) => draft.quantity = Some(v),
        (field_keys::LOW_STOCK_ALERT, FieldValue::Integer(v)) => draft.low_stock_alert = Some(v),
        _ => {}
    }
}

// ==========================================
// 警告
// ==========================================

/// 文件内重复键：除首次出现外每次出现各一条警告
fn repeated_key_warnings(rows: &[MappedRow], key: &str) -> Vec<ImportRowError> {
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut warnings = Vec::new();
    for mapped in rows {
        let Some(value) = mapped.text(key) else {
            continue;
        };
        match first_seen.get(&value) {
            Some(first) => warnings.push(ImportRowError::new(
                mapped.row,
                key,
                format!("{} 与第 {} 行重复", key, first),
                Some(value),
            )),
            None => {
                first_seen.insert(value, mapped.row);
            }
        }
    }
    warnings
}

fn price_inversion_warning(row: usize, draft: &ProductDraft) -> Option<ImportRowError> {
    let cost = draft.cost_price?;
    (cost > draft.selling_price).then(|| {
        ImportRowError::new(
            row,
            field_keys::COST_PRICE,
            format!("成本价 {} 高于售价 {}", cost, draft.selling_price),
            Some(cost.to_string()),
        )
    })
}
