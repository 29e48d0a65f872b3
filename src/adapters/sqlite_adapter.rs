//! SQLite data adapter.

use crate::domain::error::PortfolioError;
use crate::domain::price::{InstrumentInfo, PricePoint};
use crate::domain::screening::CandidateFilter;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{CandidateRow, DataPort, check_all_found, order_by_names};
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Row, params, params_from_iter};
use tracing::debug;

const INFO_COLUMNS: &str = "code, name, annual_return, volatility, dividend_yield, liquidity";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PortfolioError> {
        let db_path =
            config
                .get_string("database", "path")
                .ok_or_else(|| PortfolioError::ConfigMissing {
                    section: "database".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("database", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| PortfolioError::Database {
                reason: e.to_string(),
            })?;

        debug!(path = %db_path, pool_size, "opened sqlite pool");
        Ok(Self { pool })
    }

    /// Single-connection in-memory database, used by tests and demos.
    pub fn in_memory() -> Result<Self, PortfolioError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| PortfolioError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, PortfolioError> {
        self.pool.get().map_err(|e: r2d2::Error| PortfolioError::Database {
            reason: e.to_string(),
        })
    }

    pub fn initialize_schema(&self) -> Result<(), PortfolioError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS stock_analysis (
                code TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                annual_return REAL NOT NULL,
                volatility REAL NOT NULL,
                dividend_yield REAL NOT NULL,
                liquidity REAL NOT NULL
            );
            CREATE TABLE IF NOT EXISTS prices (
                code TEXT NOT NULL,
                date TEXT NOT NULL,
                close REAL NOT NULL,
                PRIMARY KEY (code, date)
            );
            CREATE TABLE IF NOT EXISTS benchmark (
                date TEXT PRIMARY KEY,
                close REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_stock_analysis_name ON stock_analysis(name);",
        )
        .map_err(query_err)?;

        Ok(())
    }

    pub fn insert_instruments(&self, rows: &[InstrumentInfo]) -> Result<(), PortfolioError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for r in rows {
            tx.execute(
                "INSERT OR REPLACE INTO stock_analysis
                 (code, name, annual_return, volatility, dividend_yield, liquidity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    r.code,
                    r.name,
                    r.annual_return,
                    r.volatility,
                    r.dividend_yield,
                    r.liquidity
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)
    }

    pub fn insert_prices(&self, code: &str, points: &[PricePoint]) -> Result<(), PortfolioError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for p in points {
            tx.execute(
                "INSERT OR REPLACE INTO prices (code, date, close) VALUES (?1, ?2, ?3)",
                params![code, p.date.format("%Y-%m-%d").to_string(), p.close],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)
    }

    pub fn insert_benchmark(&self, points: &[PricePoint]) -> Result<(), PortfolioError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for p in points {
            tx.execute(
                "INSERT OR REPLACE INTO benchmark (date, close) VALUES (?1, ?2)",
                params![p.date.format("%Y-%m-%d").to_string(), p.close],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)
    }

    fn query_info<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<CandidateRow>, PortfolioError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(query_err)?;
        let rows = stmt.query_map(params, row_to_info).map_err(query_err)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(query_err)?);
        }
        Ok(out)
    }

    fn query_points<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<PricePoint>, PortfolioError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(query_err)?;
        let rows = stmt
            .query_map(params, |row| {
                let date_str: String = row.get(0)?;
                let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        date_str.len(),
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(PricePoint::new(date, row.get(1)?))
            })
            .map_err(query_err)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(query_err)?);
        }
        Ok(out)
    }
}

fn query_err(e: rusqlite::Error) -> PortfolioError {
    PortfolioError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn row_to_info(row: &Row<'_>) -> rusqlite::Result<InstrumentInfo> {
    Ok(InstrumentInfo {
        code: row.get(0)?,
        name: row.get(1)?,
        annual_return: row.get(2)?,
        volatility: row.get(3)?,
        dividend_yield: row.get(4)?,
        liquidity: row.get(5)?,
    })
}

impl DataPort for SqliteAdapter {
    fn fetch_candidates(
        &self,
        filter: &CandidateFilter,
    ) -> Result<Vec<CandidateRow>, PortfolioError> {
        let sql = format!(
            "SELECT {INFO_COLUMNS} FROM stock_analysis
             WHERE dividend_yield >= ?1 AND liquidity >= ?2 AND volatility <= ?3
             ORDER BY annual_return DESC
             LIMIT ?4"
        );
        self.query_info(
            &sql,
            params![
                filter.min_dividend,
                filter.min_liquidity,
                filter.max_volatility,
                filter.limit as i64
            ],
        )
    }

    fn fetch_by_names(&self, names: &[String]) -> Result<Vec<CandidateRow>, PortfolioError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; names.len()].join(",");
        let sql = format!("SELECT {INFO_COLUMNS} FROM stock_analysis WHERE name IN ({placeholders})");
        let rows = self.query_info(&sql, params_from_iter(names.iter()))?;
        check_all_found(names, &rows)?;
        Ok(order_by_names(names, rows))
    }

    fn fetch_price_history(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, PortfolioError> {
        self.query_points(
            "SELECT date, close FROM prices
             WHERE code = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date ASC",
            params![
                code,
                start_date.format("%Y-%m-%d").to_string(),
                end_date.format("%Y-%m-%d").to_string()
            ],
        )
    }

    fn fetch_benchmark(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, PortfolioError> {
        self.query_points(
            "SELECT date, close FROM benchmark
             WHERE date >= ?1 AND date <= ?2
             ORDER BY date ASC",
            params![
                start_date.format("%Y-%m-%d").to_string(),
                end_date.format("%Y-%m-%d").to_string()
            ],
        )
    }

    fn search_names(&self, fragment: &str) -> Result<Vec<CandidateRow>, PortfolioError> {
        let sql = format!(
            "SELECT {INFO_COLUMNS} FROM stock_analysis
             WHERE name LIKE '%' || ?1 || '%'
             ORDER BY name"
        );
        self.query_info(&sql, params![fragment.trim()])
    }

    fn list_names(&self) -> Result<Vec<String>, PortfolioError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT name FROM stock_analysis ORDER BY name")
            .map_err(query_err)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;

        let mut names = Vec::new();
        for row in rows {
            names.push(row.map_err(query_err)?);
        }
        Ok(names)
    }
}
