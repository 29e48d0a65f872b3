//! PostgreSQL data adapter.
//!
//! Expects the same three tables as the SQLite adapter, with `date` columns of
//! type `date` and numeric columns castable to `double precision`.

use crate::domain::error::PortfolioError;
use crate::domain::price::{InstrumentInfo, PricePoint};
use crate::domain::screening::CandidateFilter;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{CandidateRow, DataPort, check_all_found, order_by_names};
use chrono::NaiveDate;
use postgres::types::ToSql;
use postgres::{NoTls, Row};
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use tracing::debug;

const INFO_COLUMNS: &str = "code, name, annual_return::double precision, \
                            volatility::double precision, dividend_yield::double precision, \
                            liquidity::double precision";

type Manager = PostgresConnectionManager<NoTls>;

pub struct PostgresAdapter {
    pool: Pool<Manager>,
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PortfolioError> {
        let connection_string = config
            .get_string("database", "connection_string")
            .ok_or_else(|| PortfolioError::ConfigMissing {
                section: "database".into(),
                key: "connection_string".into(),
            })?;

        let pg_config: postgres::Config =
            connection_string
                .parse()
                .map_err(|e: postgres::Error| PortfolioError::ConfigInvalid {
                    section: "database".into(),
                    key: "connection_string".into(),
                    reason: e.to_string(),
                })?;

        let pool_size = config.get_int("database", "pool_size", 4).max(1) as u32;
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(PostgresConnectionManager::new(pg_config, NoTls))
            .map_err(|e: r2d2::Error| PortfolioError::Database {
                reason: e.to_string(),
            })?;

        debug!(pool_size, "opened postgres pool");
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<Manager>, PortfolioError> {
        self.pool.get().map_err(|e: r2d2::Error| PortfolioError::Database {
            reason: e.to_string(),
        })
    }

    fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, PortfolioError> {
        self.conn()?
            .query(sql, params)
            .map_err(|e| PortfolioError::DatabaseQuery {
                reason: e.to_string(),
            })
    }
}

fn row_to_info(row: &Row) -> InstrumentInfo {
    InstrumentInfo {
        code: row.get(0),
        name: row.get(1),
        annual_return: row.get(2),
        volatility: row.get(3),
        dividend_yield: row.get(4),
        liquidity: row.get(5),
    }
}

fn row_to_point(row: &Row) -> PricePoint {
    PricePoint::new(row.get(0), row.get(1))
}

impl DataPort for PostgresAdapter {
    fn fetch_candidates(
        &self,
        filter: &CandidateFilter,
    ) -> Result<Vec<CandidateRow>, PortfolioError> {
        let sql = format!(
            "SELECT {INFO_COLUMNS} FROM public.stock_analysis \
             WHERE dividend_yield >= $1 AND liquidity >= $2 AND volatility <= $3 \
             ORDER BY annual_return DESC \
             LIMIT $4"
        );
        let limit = filter.limit as i64;
        let rows = self.query(
            &sql,
            &[
                &filter.min_dividend,
                &filter.min_liquidity,
                &filter.max_volatility,
                &limit,
            ],
        )?;
        Ok(rows.iter().map(row_to_info).collect())
    }

    fn fetch_by_names(&self, names: &[String]) -> Result<Vec<CandidateRow>, PortfolioError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {INFO_COLUMNS} FROM public.stock_analysis WHERE name = ANY($1)");
        let wanted: Vec<String> = names.to_vec();
        let rows: Vec<CandidateRow> = self.query(&sql, &[&wanted])?.iter().map(row_to_info).collect();
        check_all_found(names, &rows)?;
        Ok(order_by_names(names, rows))
    }

    fn fetch_price_history(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, PortfolioError> {
        let rows = self.query(
            "SELECT date, close::double precision FROM public.prices \
             WHERE code = $1 AND date >= $2 AND date <= $3 \
             ORDER BY date ASC",
            &[&code, &start_date, &end_date],
        )?;
        Ok(rows.iter().map(row_to_point).collect())
    }

    fn fetch_benchmark(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, PortfolioError> {
        let rows = self.query(
            "SELECT date, close::double precision FROM public.benchmark \
             WHERE date >= $1 AND date <= $2 \
             ORDER BY date ASC",
            &[&start_date, &end_date],
        )?;
        Ok(rows.iter().map(row_to_point).collect())
    }

    fn search_names(&self, fragment: &str) -> Result<Vec<CandidateRow>, PortfolioError> {
        let sql = format!(
            "SELECT {INFO_COLUMNS} FROM public.stock_analysis \
             WHERE name LIKE '%' || $1 || '%' ORDER BY name"
        );
        let fragment = fragment.trim();
        let rows = self.query(&sql, &[&fragment])?;
        Ok(rows.iter().map(row_to_info).collect())
    }

    fn list_names(&self) -> Result<Vec<String>, PortfolioError> {
        let rows = self.query(
            "SELECT DISTINCT name FROM public.stock_analysis ORDER BY name",
            &[],
        )?;
        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }
}
