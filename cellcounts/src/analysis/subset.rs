//! Baseline subset: treated samples of the configured condition and sample
//! type, taken at treatment start.
//!
//! ```text
//! condition = melanoma AND sample_type = PBMC
//!   AND treatment = miraclib AND time_from_treatment_start = 0
//! ```

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use polars::prelude::*;
use tracing::{info, warn};

use crate::config::Config;
use crate::data_handling::store::{CellCountStore, Filter, FilterColumn};
use crate::error::Result;
use crate::helper_functions::ensure_parent_dir;
use crate::models::{Population, SampleRecord};

/// Matching rows plus the grouped counts shown to the user.
#[derive(Debug, Clone)]
pub struct BaselineSubset {
    /// Raw matching rows, ordered by sample.
    pub rows: DataFrame,
    /// `(project, samples)`
    pub samples_per_project: Vec<(String, i64)>,
    /// `(lower-cased response, distinct subjects)`
    pub subjects_per_response: Vec<(String, i64)>,
    /// `(upper-cased sex, distinct subjects)`
    pub subjects_per_sex: Vec<(String, i64)>,
    pub subject_count: usize,
}

impl BaselineSubset {
    pub fn sample_count(&self) -> usize {
        self.rows.height()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.height() == 0
    }

    /// First `limit` matching rows as CSV, header included.
    pub fn write_preview<W: Write>(&self, limit: usize, out: W) -> Result<()> {
        let mut head = self.rows.head(Some(limit));
        CsvWriter::new(out).include_header(true).finish(&mut head)?;
        Ok(())
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        ensure_parent_dir(path)?;
        let mut file = File::create(path)?;
        let mut rows = self.rows.clone();
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut rows)?;
        info!("Baseline rows written to {}", path.display());
        Ok(())
    }
}

pub fn baseline_filter(config: &Config) -> Filter {
    Filter::new()
        .eq_text(FilterColumn::Condition, config.baseline.condition.as_str())
        .eq_text(FilterColumn::SampleType, config.sample_type.as_str())
        .eq_text(FilterColumn::Treatment, config.baseline.treatment.as_str())
        .eq_int(
            FilterColumn::TimeFromTreatmentStart,
            config.baseline.time_from_treatment_start,
        )
}

pub fn fetch_baseline(store: &CellCountStore, config: &Config) -> Result<BaselineSubset> {
    let records = store.fetch(&baseline_filter(config))?;
    let subset = summarize_baseline(&records)?;
    if subset.is_empty() {
        warn!("No baseline samples matched the subset predicate");
    }
    Ok(subset)
}

pub fn summarize_baseline(records: &[SampleRecord]) -> Result<BaselineSubset> {
    let rows = records_to_frame(records)?;

    let samples_per_project = grouped_counts(&rows, col("project"), col("sample").count())?;
    let subjects_per_response = grouped_counts(
        &rows,
        col("response").str().to_lowercase(),
        col("subject").n_unique(),
    )?;
    let subjects_per_sex = grouped_counts(
        &rows,
        col("sex").str().to_uppercase(),
        col("subject").n_unique(),
    )?;
    let subject_count = records
        .iter()
        .filter_map(|r| r.subject.as_deref())
        .collect::<BTreeSet<_>>()
        .len();

    Ok(BaselineSubset {
        rows,
        samples_per_project,
        subjects_per_response,
        subjects_per_sex,
        subject_count,
    })
}

fn records_to_frame(records: &[SampleRecord]) -> PolarsResult<DataFrame> {
    let text = |f: fn(&SampleRecord) -> &Option<String>| -> Vec<Option<String>> {
        records.iter().map(|r| f(r).clone()).collect()
    };

    let mut columns = vec![
        Column::from(Series::new(
            "sample".into(),
            records.iter().map(|r| r.sample.clone()).collect::<Vec<_>>(),
        )),
        Column::from(Series::new("project".into(), text(|r| &r.project))),
        Column::from(Series::new("subject".into(), text(|r| &r.subject))),
        Column::from(Series::new("condition".into(), text(|r| &r.condition))),
        Column::from(Series::new("treatment".into(), text(|r| &r.treatment))),
        Column::from(Series::new("response".into(), text(|r| &r.response))),
        Column::from(Series::new("sex".into(), text(|r| &r.sex))),
        Column::from(Series::new(
            "age".into(),
            records.iter().map(|r| r.age).collect::<Vec<_>>(),
        )),
        Column::from(Series::new("sample_type".into(), text(|r| &r.sample_type))),
        Column::from(Series::new(
            "time_from_treatment_start".into(),
            records
                .iter()
                .map(|r| r.time_from_treatment_start)
                .collect::<Vec<_>>(),
        )),
    ];
    for population in Population::ALL {
        let counts: Vec<i64> = records
            .iter()
            .map(|r| r.counts.get(population) as i64)
            .collect();
        columns.push(Column::from(Series::new(population.column().into(), counts)));
    }
    DataFrame::new(columns)
}

/// `(key, n)` pairs sorted by key; null and empty keys are dropped.
fn grouped_counts(df: &DataFrame, key: Expr, value: Expr) -> Result<Vec<(String, i64)>> {
    let out = df
        .clone()
        .lazy()
        .with_column(key.alias("key"))
        .filter(col("key").is_not_null().and(col("key").neq(lit(""))))
        .group_by([col("key")])
        .agg([value.cast(DataType::Int64).alias("n")])
        .sort(["key"], SortMultipleOptions::default())
        .collect()?;

    let keys = out.column("key")?.str()?;
    let counts = out.column("n")?.i64()?;
    Ok(keys
        .into_iter()
        .zip(counts.into_iter())
        .filter_map(|(k, n)| Some((k?.to_string(), n?)))
        .collect())
}
