// ==========================================
// 商品目录导入引擎 - 文件解码器
// ==========================================
// 支持: CSV (.csv) / Excel (.xlsx/.xls，首个工作表)
// 输出: 有序表头 + 有序数据行（整行空白跳过）
// 结构性失败: 无法解码 / 缺少表头 / 没有数据行 / 表头重复
// ==========================================

use crate::domain::import_job::{DecodedSheet, UploadedFile};
use crate::domain::product::CellValue;
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use csv::ReaderBuilder;
use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;
use std::path::Path;

// ==========================================
// FileDecoder Trait
// ==========================================
pub trait FileDecoder: Send + Sync {
    fn decode(&self, file: &UploadedFile) -> ImportResult<DecodedSheet>;
}

/// 表头清洗 + 重复检查；返回 (列下标, 表头) 列表，空表头列忽略
fn index_headers(
    raw: Vec<String>,
    on_error: fn(String) -> ImportError,
) -> ImportResult<(Vec<String>, Vec<(usize, String)>)> {
    let mut seen = HashSet::new();
    let mut headers = Vec::new();
    let mut columns = Vec::new();
    for (idx, header) in raw.into_iter().enumerate() {
        let header = header.trim_start_matches('\u{feff}').trim().to_string();
        if header.is_empty() {
            continue;
        }
        if !seen.insert(header.clone()) {
            return Err(on_error(format!("表头重复: {}", header)));
        }
        headers.push(header.clone());
        columns.push((idx, header));
    }
    if headers.is_empty() {
        return Err(ImportError::EmptyFile("缺少表头行".to_string()));
    }
    Ok((headers, columns))
}

fn finish(headers: Vec<String>, rows: Vec<BTreeMap<String, CellValue>>) -> ImportResult<DecodedSheet> {
    if rows.is_empty() {
        return Err(ImportError::EmptyFile("没有数据行".to_string()));
    }
    Ok(DecodedSheet { headers, rows })
}

// ==========================================
// CSV Decoder 实现
// ==========================================
pub struct CsvDecoder;

impl FileDecoder for CsvDecoder {
    fn decode(&self, file: &UploadedFile) -> ImportResult<DecodedSheet> {
        if file.bytes.is_empty() {
            return Err(ImportError::EmptyFile(file.file_name.clone()));
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(file.bytes.as_slice());

        let raw_headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let (headers, columns) = index_headers(raw_headers, ImportError::CsvParseError)?;

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let mut row_map = BTreeMap::new();
            for (col_idx, header) in &columns {
                if let Some(value) = record.get(*col_idx) {
                    row_map.insert(header.clone(), CellValue::Text(value.trim().to_string()));
                }
            }

            // 跳过完全空白的行
            if row_map.values().all(CellValue::is_blank) {
                continue;
            }
            rows.push(row_map);
        }

        finish(headers, rows)
    }
}

// ==========================================
// Excel Decoder 实现
// ==========================================
pub struct ExcelDecoder;

impl ExcelDecoder {
    fn cell_value(cell: &Data) -> Option<CellValue> {
        match cell {
            Data::Empty => None,
            Data::Float(f) => Some(CellValue::Number(*f)),
            Data::Int(i) => Some(CellValue::Number(*i as f64)),
            Data::String(s) => Some(CellValue::Text(s.trim().to_string())),
            other => Some(CellValue::Text(other.to_string().trim().to_string())),
        }
    }
}

impl FileDecoder for ExcelDecoder {
    fn decode(&self, file: &UploadedFile) -> ImportResult<DecodedSheet> {
        if file.bytes.is_empty() {
            return Err(ImportError::EmptyFile(file.file_name.clone()));
        }

        let mut workbook = open_workbook_auto_from_rs(Cursor::new(file.bytes.clone()))?;

        // 读取第一个 sheet
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无工作表".to_string()))?;
        let range = workbook.worksheet_range(&sheet_name)?;

        // 提取表头（第一行）
        let mut sheet_rows = range.rows();
        let header_row = sheet_rows
            .next()
            .ok_or_else(|| ImportError::EmptyFile("缺少表头行".to_string()))?;
        let raw_headers = header_row.iter().map(|c| c.to_string()).collect();
        let (headers, columns) = index_headers(raw_headers, ImportError::ExcelParseError)?;

        let mut rows = Vec::new();
        for data_row in sheet_rows {
            let mut row_map = BTreeMap::new();
            for (col_idx, header) in &columns {
                if let Some(value) = data_row.get(*col_idx).and_then(Self::cell_value) {
                    row_map.insert(header.clone(), value);
                }
            }

            if row_map.values().all(CellValue::is_blank) {
                continue;
            }
            rows.push(row_map);
        }

        finish(headers, rows)
    }
}

// ==========================================
// 通用解码器（根据扩展名 / MIME 自动选择）
// ==========================================
pub struct UniversalDecoder;

impl UniversalDecoder {
    fn format_of(file: &UploadedFile) -> String {
        let ext = Path::new(&file.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        if !ext.is_empty() {
            return ext;
        }
        match file.file_type.as_str() {
            "text/csv" => "csv".to_string(),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
                "xlsx".to_string()
            }
            "application/vnd.ms-excel" => "xls".to_string(),
            other => other.to_string(),
        }
    }
}

impl FileDecoder for UniversalDecoder {
    fn decode(&self, file: &UploadedFile) -> ImportResult<DecodedSheet> {
        match Self::format_of(file).as_str() {
            "csv" => CsvDecoder.decode(file),
            "xlsx" | "xls" => ExcelDecoder.decode(file),
            other => Err(ImportError::UnsupportedFormat(other.to_string())),
        }
    }
}
