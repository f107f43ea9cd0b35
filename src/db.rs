// ==========================================
// 商品目录导入引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 建表幂等（CREATE TABLE IF NOT EXISTS）
// ==========================================

use rusqlite::Connection;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 创建导入引擎所需的全部表
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS config_kv (
          scope_id TEXT NOT NULL DEFAULT 'global',
          key TEXT NOT NULL,
          value TEXT NOT NULL,
          updated_at TEXT NOT NULL DEFAULT (datetime('now')),
          PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS product (
          id TEXT PRIMARY KEY,
          business_id TEXT NOT NULL,
          name TEXT NOT NULL,
          name_key TEXT NOT NULL,
          sku TEXT,
          barcode TEXT,
          description TEXT,
          category TEXT,
          unit TEXT,
          cost_price REAL,
          selling_price REAL NOT NULL,
          quantity INTEGER NOT NULL DEFAULT 0,
          low_stock_alert INTEGER,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_product_business_sku ON product(business_id, sku);
        CREATE INDEX IF NOT EXISTS idx_product_business_barcode ON product(business_id, barcode);
        CREATE INDEX IF NOT EXISTS idx_product_business_name ON product(business_id, name_key);

        CREATE TABLE IF NOT EXISTS import_job (
          id TEXT PRIMARY KEY,
          business_id TEXT NOT NULL,
          status TEXT NOT NULL CHECK(status IN (
            'pending', 'validating', 'validated', 'processing',
            'completed', 'failed', 'cancelled', 'rolled_back'
          )),
          file_name TEXT NOT NULL,
          file_type TEXT NOT NULL,
          file_size INTEGER NOT NULL DEFAULT 0,
          total_rows INTEGER NOT NULL DEFAULT 0,
          processed_rows INTEGER NOT NULL DEFAULT 0,
          created_count INTEGER NOT NULL DEFAULT 0,
          updated_count INTEGER NOT NULL DEFAULT 0,
          skipped_count INTEGER NOT NULL DEFAULT 0,
          failed_count INTEGER NOT NULL DEFAULT 0,
          duplicate_action TEXT NOT NULL DEFAULT 'skip',
          column_mapping_json TEXT NOT NULL DEFAULT '{}',
          errors_json TEXT NOT NULL DEFAULT '[]',
          warnings_json TEXT NOT NULL DEFAULT '[]',
          results_json TEXT NOT NULL DEFAULT '[]',
          error_message TEXT,
          created_at TEXT NOT NULL,
          started_at TEXT,
          completed_at TEXT,
          rollback_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_import_job_business_created
          ON import_job(business_id, created_at DESC);

        CREATE TABLE IF NOT EXISTS import_job_rows (
          job_id TEXT PRIMARY KEY REFERENCES import_job(id) ON DELETE CASCADE,
          sheet_json TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}
