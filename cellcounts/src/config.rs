//! Run configuration, passed explicitly into every component.
//!
//! A JSON file may set any subset of the fields; the rest fall back to the
//! defaults below.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::Population;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: PathBuf,
    pub table: String,
    pub csv_path: PathBuf,
    pub populations: Vec<Population>,
    pub significance_threshold: f64,
    pub sample_type: String,
    pub baseline: BaselineFilter,
    pub plot_output: PathBuf,
}

/// Predicate selecting baseline samples of the treated cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineFilter {
    pub condition: String,
    pub treatment: String,
    pub time_from_treatment_start: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("example.db"),
            table: "cell_counts".to_string(),
            csv_path: PathBuf::from("cell-count.csv"),
            populations: Population::ALL.to_vec(),
            significance_threshold: 0.05,
            sample_type: "PBMC".to_string(),
            baseline: BaselineFilter::default(),
            plot_output: PathBuf::from("response_boxplot.png"),
        }
    }
}

impl Default for BaselineFilter {
    fn default() -> Self {
        Self {
            condition: "melanoma".to_string(),
            treatment: "miraclib".to_string(),
            time_from_treatment_start: 0,
        }
    }
}

impl Config {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        debug!("Reading configuration from {}", path.display());
        let text = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_sql_identifier(&self.table) {
            return Err(Error::InvalidConfig(format!(
                "table name '{}' is not a plain SQL identifier",
                self.table
            )));
        }
        if self.populations.is_empty() {
            return Err(Error::InvalidConfig("population list is empty".into()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.populations.iter().find(|p| !seen.insert(**p)) {
            return Err(Error::InvalidConfig(format!("population '{dup}' listed twice")));
        }
        let t = self.significance_threshold;
        if !(t > 0.0 && t < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "significance threshold {t} must lie strictly between 0 and 1"
            )));
        }
        Ok(())
    }
}

/// The relation name is spliced into SQL text, so only bare identifiers pass.
fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.table, "cell_counts");
        assert_eq!(config.populations.len(), 5);
        assert_eq!(config.significance_threshold, 0.05);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"table": "counts_v2", "populations": ["monocyte", "b_cell"], "baseline": {{"treatment": "tx"}}}}"#
        )
        .unwrap();

        let config = Config::from_json_file(file.path()).unwrap();
        assert_eq!(config.table, "counts_v2");
        assert_eq!(config.populations, vec![Population::Monocyte, Population::BCell]);
        assert_eq!(config.baseline.treatment, "tx");
        assert_eq!(config.baseline.condition, "melanoma");
        assert_eq!(config.database, PathBuf::from("example.db"));
    }

    #[test]
    fn rejects_unsafe_table_names() {
        for bad in ["", "1counts", "cell counts", "counts;DROP TABLE x"] {
            let config = Config { table: bad.to_string(), ..Config::default() };
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))), "{bad}");
        }
    }

    #[test]
    fn rejects_duplicate_populations_and_bad_threshold() {
        let dup = Config {
            populations: vec![Population::NkCell, Population::NkCell],
            ..Config::default()
        };
        assert!(dup.validate().is_err());

        let empty = Config { populations: vec![], ..Config::default() };
        assert!(empty.validate().is_err());

        for t in [0.0, 1.0, -0.5, f64::NAN] {
            let config = Config { significance_threshold: t, ..Config::default() };
            assert!(config.validate().is_err(), "{t}");
        }
    }
}
