use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{error, info};

use crate::data_handling::store::CellCountStore;
use crate::error::{Error, Result};
use crate::models::{checked_total, PopulationCounts, SampleRecord};

/// Column order of the `cell_counts` relation and of the source CSV.
pub const COLUMNS: [&str; 15] = [
    "project",
    "subject",
    "condition",
    "age",
    "sex",
    "treatment",
    "response",
    "sample",
    "sample_type",
    "time_from_treatment_start",
    "b_cell",
    "cd8_t_cell",
    "cd4_t_cell",
    "nk_cell",
    "monocyte",
];

/// Untyped-null view of one row, shared by the CSV reader and the SQLite
/// reader. Empty CSV cells and SQL NULLs both land as `None`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, sqlx::FromRow)]
pub struct CellCountRow {
    pub project: Option<String>,
    pub subject: Option<String>,
    pub condition: Option<String>,
    pub age: Option<i64>,
    pub sex: Option<String>,
    pub treatment: Option<String>,
    pub response: Option<String>,
    pub sample: Option<String>,
    pub sample_type: Option<String>,
    pub time_from_treatment_start: Option<i64>,
    pub b_cell: Option<i64>,
    pub cd8_t_cell: Option<i64>,
    pub cd4_t_cell: Option<i64>,
    pub nk_cell: Option<i64>,
    pub monocyte: Option<i64>,
}

impl CellCountRow {
    fn raw_counts(&self) -> [(&'static str, Option<i64>); 5] {
        [
            ("b_cell", self.b_cell),
            ("cd8_t_cell", self.cd8_t_cell),
            ("cd4_t_cell", self.cd4_t_cell),
            ("nk_cell", self.nk_cell),
            ("monocyte", self.monocyte),
        ]
    }

    /// Sample total of the non-negative counts, `None` on overflow.
    fn checked_total(&self) -> Option<u64> {
        let counts: Vec<u64> = self
            .raw_counts()
            .into_iter()
            .map(|(_, v)| v.map_or(0, |v| v.max(0) as u64))
            .collect();
        checked_total(&counts)
    }

    /// First negative population count, if any.
    fn negative_count(&self) -> Option<(&'static str, i64)> {
        self.raw_counts()
            .into_iter()
            .find_map(|(name, v)| v.filter(|v| *v < 0).map(|v| (name, v)))
    }

    /// Converts to a typed record. `position` only feeds the error message.
    pub fn into_record(self, position: usize) -> Result<SampleRecord> {
        let sample = match self.sample.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => {
                return Err(Error::RejectedRow {
                    position,
                    reason: "missing sample identifier".into(),
                })
            }
        };
        if let Some((name, v)) = self.negative_count() {
            return Err(Error::RejectedRow {
                position,
                reason: format!("negative {name} count {v} for sample {sample}"),
            });
        }

        let count = |v: Option<i64>| v.map_or(0, |v| v as u64);
        let counts = PopulationCounts::new(
            count(self.b_cell),
            count(self.cd8_t_cell),
            count(self.cd4_t_cell),
            count(self.nk_cell),
            count(self.monocyte),
        )
        .ok_or_else(|| Error::RejectedRow {
            position,
            reason: format!("population counts of sample {sample} overflow the sample total"),
        })?;

        Ok(SampleRecord {
            project: self.project,
            subject: self.subject,
            condition: self.condition,
            age: self.age,
            sex: self.sex,
            treatment: self.treatment,
            response: self.response,
            sample,
            sample_type: self.sample_type,
            time_from_treatment_start: self.time_from_treatment_start,
            counts,
        })
    }
}

/// The raw cell-count export handed over by the lab.
pub struct CellCountCsv {
    pub path: PathBuf,
}

impl CellCountCsv {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parses the whole file up front. Nothing touches the database until
    /// this has succeeded.
    pub fn load(&self) -> Result<Vec<CellCountRow>> {
        info!("Reading cell counts from {}", self.path.display());
        let file = File::open(&self.path).map_err(|e| {
            error!("Failed to open {}: {}", self.path.display(), e);
            malformed(&self.path, "file", format!("cannot open source file: {e}"))
        })?;
        let mut reader = csv::Reader::from_reader(file);

        let headers = reader
            .headers()
            .map_err(|e| malformed(&self.path, "header", e.to_string()))?
            .clone();
        if let Some(missing) = COLUMNS.iter().find(|c| !headers.iter().any(|h| h == **c)) {
            return Err(malformed(&self.path, "header", format!("missing column '{missing}'")));
        }

        let mut rows = Vec::new();
        let mut record = csv::StringRecord::new();
        loop {
            let more = reader
                .read_record(&mut record)
                .map_err(|e| malformed(&self.path, &line_of(e.position()), e.to_string()))?;
            if !more {
                break;
            }
            let line = line_of(record.position());
            let row: CellCountRow = record
                .deserialize(Some(&headers))
                .map_err(|e| malformed(&self.path, &line, e.to_string()))?;
            if let Some((name, v)) = row.negative_count() {
                return Err(malformed(&self.path, &line, format!("negative {name} count {v}")));
            }
            if row.checked_total().is_none() {
                return Err(malformed(
                    &self.path,
                    &line,
                    "population counts overflow the sample total".into(),
                ));
            }
            rows.push(row);
        }

        info!("Parsed {} rows from {}", rows.len(), self.path.display());
        Ok(rows)
    }

    /// Parses the file, then swaps the relation's contents for its rows.
    pub fn load_into(&self, store: &CellCountStore) -> Result<usize> {
        let rows = self.load()?;
        store.replace_all(&rows)
    }
}

fn line_of(position: Option<&csv::Position>) -> String {
    position.map_or_else(|| "unknown line".to_string(), |p| format!("line {}", p.line()))
}

fn malformed(path: &Path, location: &str, reason: String) -> Error {
    Error::MalformedInput {
        location: format!("{}: {location}", path.display()),
        reason,
    }
}
