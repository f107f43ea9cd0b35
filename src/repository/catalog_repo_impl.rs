// ==========================================
// 商品目录导入引擎 - 商品目录 Repository 实现
// ==========================================
// 职责: 实现 CatalogStore（使用 rusqlite）
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::db::{ensure_schema, open_sqlite_connection};
use crate::domain::product::{name_key, Product, ProductFields};
use crate::repository::catalog_repo::{CandidateKeys, CatalogStore};
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

// 单条 IN 查询的参数上限
const IN_CHUNK_SIZE: usize = 400;

const PRODUCT_COLUMNS: &str = "id, business_id, name, sku, barcode, description, category, unit, \
     cost_price, selling_price, quantity, low_stock_alert, created_at, updated_at";

pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn map_product(row: &Row) -> rusqlite::Result<Product> {
    let created_at: String = row.get(12)?;
    let updated_at: String = row.get(13)?;
    Ok(Product {
        id: row.get(0)?,
        business_id: row.get(1)?,
        fields: ProductFields {
            name: row.get(2)?,
            sku: row.get(3)?,
            barcode: row.get(4)?,
            description: row.get(5)?,
            category: row.get(6)?,
            unit: row.get(7)?,
            cost_price: row.get(8)?,
            selling_price: row.get(9)?,
            quantity: row.get(10)?,
            low_stock_alert: row.get(11)?,
        },
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

// ==========================================
// ProductCatalogRepository
// ==========================================
pub struct ProductCatalogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProductCatalogRepository {
    /// 创建新的 Repository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径（":memory:" 用于测试）
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建（与作业仓储共享同一数据库）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            ensure_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn find_by_id(conn: &Connection, id: &str) -> RepositoryResult<Option<Product>> {
        let sql = format!("SELECT {} FROM product WHERE id = ?1", PRODUCT_COLUMNS);
        let product = conn
            .query_row(&sql, params![id], map_product)
            .optional()?;
        Ok(product)
    }

    /// 在单列上做分块 IN 查询，结果合并进 found
    fn collect_by_column(
        conn: &Connection,
        business_id: &str,
        column_expr: &str,
        values: &[String],
        found: &mut BTreeMap<String, Product>,
    ) -> RepositoryResult<()> {
        for chunk in values.chunks(IN_CHUNK_SIZE) {
            let placeholders = (0..chunk.len())
                .map(|i| format!("?{}", i + 2))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT {} FROM product WHERE business_id = ?1 AND {} IN ({})",
                PRODUCT_COLUMNS, column_expr, placeholders
            );

            let mut stmt = conn.prepare(&sql)?;
            let bind = std::iter::once(business_id.to_string()).chain(chunk.iter().cloned());
            let rows = stmt.query_map(params_from_iter(bind), map_product)?;
            for row in rows {
                let product = row?;
                found.insert(product.id.clone(), product);
            }
        }
        Ok(())
    }

    /// 统计业务范围内商品数
    pub fn count_products(&self, business_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM product WHERE business_id = ?1",
            params![business_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[async_trait]
impl CatalogStore for ProductCatalogRepository {
    async fn get_product(&self, id: &str) -> RepositoryResult<Option<Product>> {
        let conn = self.get_conn()?;
        Self::find_by_id(&conn, id)
    }

    async fn find_candidates(
        &self,
        business_id: &str,
        keys: &CandidateKeys,
    ) -> RepositoryResult<Vec<Product>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.get_conn()?;
        let mut found = BTreeMap::new();

        Self::collect_by_column(&conn, business_id, "sku", &keys.skus, &mut found)?;
        Self::collect_by_column(&conn, business_id, "barcode", &keys.barcodes, &mut found)?;
        let folded: Vec<String> = keys.names.iter().map(|n| name_key(n)).collect();
        Self::collect_by_column(&conn, business_id, "name_key", &folded, &mut found)?;

        let mut products: Vec<Product> = found.into_values().collect();
        products.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(products)
    }

    async fn create_product(
        &self,
        business_id: &str,
        fields: &ProductFields,
    ) -> RepositoryResult<Product> {
        let conn = self.get_conn()?;
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4().to_string(),
            business_id: business_id.to_string(),
            fields: fields.clone(),
            created_at: now,
            updated_at: now,
        };

        conn.execute(
            r#"
            INSERT INTO product (
              id, business_id, name, name_key, sku, barcode, description, category, unit,
              cost_price, selling_price, quantity, low_stock_alert, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                product.id,
                product.business_id,
                fields.name,
                name_key(&fields.name),
                fields.sku,
                fields.barcode,
                fields.description,
                fields.category,
                fields.unit,
                fields.cost_price,
                fields.selling_price,
                fields.quantity,
                fields.low_stock_alert,
                format_ts(&product.created_at),
                format_ts(&product.updated_at),
            ],
        )?;

        Ok(product)
    }

    async fn update_product(&self, id: &str, fields: &ProductFields) -> RepositoryResult<Product> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE product SET
              name = ?2, name_key = ?3, sku = ?4, barcode = ?5, description = ?6, category = ?7,
              unit = ?8, cost_price = ?9, selling_price = ?10, quantity = ?11,
              low_stock_alert = ?12, updated_at = ?13
            WHERE id = ?1
            "#,
            params![
                id,
                fields.name,
                name_key(&fields.name),
                fields.sku,
                fields.barcode,
                fields.description,
                fields.category,
                fields.unit,
                fields.cost_price,
                fields.selling_price,
                fields.quantity,
                fields.low_stock_alert,
                format_ts(&Utc::now()),
            ],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "product".to_string(),
                id: id.to_string(),
            });
        }

        Self::find_by_id(&conn, id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "product".to_string(),
            id: id.to_string(),
        })
    }

    async fn delete_product(&self, id: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute("DELETE FROM product WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "product".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }
}
