//! Synchronous access to the SQLite relation holding the cell counts.
//!
//! Each public operation opens its own connection, runs to completion on a
//! private current-thread runtime and closes the connection again.

use std::future::Future;
use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

use crate::config::Config;
use crate::data_handling::cell_counts::{CellCountRow, COLUMNS};
use crate::error::{Error, Result};
use crate::models::SampleRecord;

/// Categorical fields a query may constrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterColumn {
    Condition,
    Treatment,
    SampleType,
    TimeFromTreatmentStart,
}

impl FilterColumn {
    fn column(self) -> &'static str {
        match self {
            FilterColumn::Condition => "condition",
            FilterColumn::Treatment => "treatment",
            FilterColumn::SampleType => "sample_type",
            FilterColumn::TimeFromTreatmentStart => "time_from_treatment_start",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
}

/// Conjunction of equality constraints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(FilterColumn, FilterValue)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq_text(mut self, column: FilterColumn, value: impl Into<String>) -> Self {
        self.clauses.push((column, FilterValue::Text(value.into())));
        self
    }

    pub fn eq_int(mut self, column: FilterColumn, value: i64) -> Self {
        self.clauses.push((column, FilterValue::Integer(value)));
        self
    }

    fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            return String::new();
        }
        let terms: Vec<String> = self
            .clauses
            .iter()
            .map(|(c, _)| format!("{} = ?", c.column()))
            .collect();
        format!(" WHERE {}", terms.join(" AND "))
    }
}

pub struct CellCountStore {
    database: PathBuf,
    table: String,
    runtime: Runtime,
}

impl CellCountStore {
    /// Takes the table name from an already validated [`Config`].
    pub fn new(config: &Config) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            database: config.database.clone(),
            table: config.table.clone(),
            runtime,
        })
    }

    pub fn database(&self) -> &Path {
        &self.database
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.runtime.block_on(fut)
    }

    async fn connect(&self, create_if_missing: bool) -> Result<SqliteConnection> {
        debug!("Opening SQLite database {}", self.database.display());
        let conn = SqliteConnectOptions::new()
            .filename(&self.database)
            .create_if_missing(create_if_missing)
            .connect()
            .await?;
        Ok(conn)
    }

    /// Rows matching every clause of `filter`, ordered by sample identifier.
    pub fn fetch(&self, filter: &Filter) -> Result<Vec<SampleRecord>> {
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY sample",
            COLUMNS.join(", "),
            self.table,
            filter.where_clause()
        );
        debug!("Query: {}", sql);

        let rows = self.run(async {
            let mut conn = self.connect(false).await?;
            let mut query = sqlx::query_as::<_, CellCountRow>(&sql);
            for (_, value) in &filter.clauses {
                query = match value {
                    FilterValue::Text(s) => query.bind(s.clone()),
                    FilterValue::Integer(i) => query.bind(*i),
                };
            }
            let rows = query.fetch_all(&mut conn).await?;
            conn.close().await?;
            Ok::<_, Error>(rows)
        })?;

        let records = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| row.into_record(i + 1))
            .collect::<Result<Vec<_>>>()?;
        info!("Fetched {} rows from '{}'", records.len(), self.table);
        Ok(records)
    }

    pub fn fetch_all(&self) -> Result<Vec<SampleRecord>> {
        self.fetch(&Filter::new())
    }

    pub fn row_count(&self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        self.run(async {
            let mut conn = self.connect(false).await?;
            let count = sqlx::query_scalar::<_, i64>(&sql).fetch_one(&mut conn).await?;
            conn.close().await?;
            Ok::<_, Error>(count)
        })
    }

    /// Clear-then-insert inside a single transaction: either every row of
    /// `rows` replaces the relation or the relation is left untouched.
    pub fn replace_all(&self, rows: &[CellCountRow]) -> Result<usize> {
        let create_sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                project TEXT,
                subject TEXT,
                condition TEXT,
                age INTEGER,
                sex TEXT,
                treatment TEXT,
                response TEXT,
                sample TEXT,
                sample_type TEXT,
                time_from_treatment_start INTEGER,
                b_cell INTEGER,
                cd8_t_cell INTEGER,
                cd4_t_cell INTEGER,
                nk_cell INTEGER,
                monocyte INTEGER
            )",
            self.table
        );
        let delete_sql = format!("DELETE FROM {}", self.table);
        let placeholders = vec!["?"; COLUMNS.len()].join(", ");
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            COLUMNS.join(", "),
            placeholders
        );

        self.run(async {
            let mut conn = self.connect(true).await?;
            let mut tx = conn.begin().await?;
            sqlx::query(&create_sql).execute(&mut *tx).await?;
            sqlx::query(&delete_sql).execute(&mut *tx).await?;
            for row in rows {
                sqlx::query(&insert_sql)
                    .bind(row.project.clone())
                    .bind(row.subject.clone())
                    .bind(row.condition.clone())
                    .bind(row.age)
                    .bind(row.sex.clone())
                    .bind(row.treatment.clone())
                    .bind(row.response.clone())
                    .bind(row.sample.clone())
                    .bind(row.sample_type.clone())
                    .bind(row.time_from_treatment_start)
                    .bind(row.b_cell)
                    .bind(row.cd8_t_cell)
                    .bind(row.cd4_t_cell)
                    .bind(row.nk_cell)
                    .bind(row.monocyte)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            conn.close().await?;
            Ok::<_, Error>(())
        })?;

        info!("Replaced '{}' with {} rows", self.table, rows.len());
        Ok(rows.len())
    }
}

/// Shorthand for building test fixtures straight into a scratch database.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn row(
        sample: &str,
        response: Option<&str>,
        sample_type: &str,
        counts: [i64; 5],
    ) -> CellCountRow {
        CellCountRow {
            project: Some("prj1".into()),
            subject: Some(format!("sbj_{sample}")),
            condition: Some("melanoma".into()),
            age: Some(60),
            sex: Some("F".into()),
            treatment: Some("miraclib".into()),
            response: response.map(str::to_string),
            sample: Some(sample.into()),
            sample_type: Some(sample_type.into()),
            time_from_treatment_start: Some(0),
            b_cell: Some(counts[0]),
            cd8_t_cell: Some(counts[1]),
            cd4_t_cell: Some(counts[2]),
            nk_cell: Some(counts[3]),
            monocyte: Some(counts[4]),
        }
    }

    /// Store backed by a fresh file inside `dir`.
    pub fn store_in(dir: &tempfile::TempDir, rows: &[CellCountRow]) -> (Config, CellCountStore) {
        let config = Config {
            database: dir.path().join("test.db"),
            ..Config::default()
        };
        let store = CellCountStore::new(&config).unwrap();
        store.replace_all(rows).unwrap();
        (config, store)
    }
}
