//! Plain-text dashboard over the loaded relation: data management,
//! population frequencies, responder comparison and the baseline subset.

use std::io::Write;

use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::analysis::boxplot::BoxPlotRenderer;
use crate::analysis::frequency::{frequency_rows, FrequencyRow};
use crate::analysis::report::write_comparison_csv;
use crate::analysis::response::compare_records;
use crate::analysis::significance::SignificanceTester;
use crate::analysis::subset::fetch_baseline;
use crate::config::Config;
use crate::data_handling::store::CellCountStore;
use crate::error::{Error, Result};
use crate::helper_functions::{resolve_path, skip_notice};
use crate::models::SampleRecord;

const HEAD_ROWS: usize = 5;

/// Full-table snapshot, read from the store on first use and kept for the
/// rest of the process.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    records: OnceCell<Vec<SampleRecord>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(&self, store: &CellCountStore) -> Result<&[SampleRecord]> {
        let records = self.records.get_or_try_init(|| {
            info!("Loading dashboard snapshot from '{}'", store.table());
            store.fetch_all()
        })?;
        Ok(records)
    }

    pub fn is_loaded(&self) -> bool {
        self.records.get().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardOptions {
    /// Sample shown in the frequency section; the first sample when unset.
    pub sample: Option<String>,
    pub preview_rows: usize,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self { sample: None, preview_rows: 10 }
    }
}

pub struct Dashboard<'a> {
    config: &'a Config,
    store: &'a CellCountStore,
    cache: &'a SnapshotCache,
    tester: SignificanceTester,
    renderer: BoxPlotRenderer,
}

impl<'a> Dashboard<'a> {
    pub fn new(config: &'a Config, store: &'a CellCountStore, cache: &'a SnapshotCache) -> Self {
        Self {
            config,
            store,
            cache,
            tester: SignificanceTester::from_build(),
            renderer: BoxPlotRenderer::from_build(),
        }
    }

    #[cfg(test)]
    pub fn with_capabilities(mut self, tester: SignificanceTester, renderer: BoxPlotRenderer) -> Self {
        self.tester = tester;
        self.renderer = renderer;
        self
    }

    pub fn render<W: Write>(&self, options: &DashboardOptions, out: &mut W) -> Result<()> {
        let records = self.cache.get_or_load(self.store)?;

        // ── 1) Data management ──
        let typed: Vec<SampleRecord> = records
            .iter()
            .filter(|r| r.sample_type.as_deref() == Some(self.config.sample_type.as_str()))
            .cloned()
            .collect();
        section(out, "Data management")?;
        writeln!(out, "Total samples: {}", records.len())?;
        writeln!(out, "{} entries: {}", self.config.sample_type, typed.len())?;
        writeln!(out, "sample,project,subject,condition,treatment,response,sample_type,total")?;
        for r in records.iter().take(HEAD_ROWS) {
            writeln!(
                out,
                "{},{},{},{},{},{},{},{}",
                r.sample,
                text(&r.project),
                text(&r.subject),
                text(&r.condition),
                text(&r.treatment),
                text(&r.response),
                text(&r.sample_type),
                r.counts.total()
            )?;
        }

        // ── 2) Population frequencies ──
        section(out, "Population frequencies")?;
        let freq = frequency_rows(records, &self.config.populations);
        let selected = options
            .sample
            .as_deref()
            .or_else(|| records.first().map(|r| r.sample.as_str()));
        match selected {
            Some(sample) if freq.iter().any(|f| f.sample == sample) => {
                writeln!(out, "Sample {sample}:")?;
                for row in freq.iter().filter(|f| f.sample == sample) {
                    write_frequency_line(out, row)?;
                }
            }
            Some(sample) => {
                warn!("Sample '{}' not found", sample);
                writeln!(out, "warning: sample '{sample}' not found")?;
            }
            None => writeln!(out, "No samples loaded")?,
        }
        writeln!(out, "First {} frequency rows:", options.preview_rows.min(freq.len()))?;
        for row in freq.iter().take(options.preview_rows) {
            write_frequency_line(out, row)?;
        }

        // ── 3) Responder comparison ──
        section(out, "Responder comparison")?;
        let comparison = compare_records(&typed, self.config, self.tester);
        if !self.tester.is_available() {
            skip_notice(
                out,
                "significance testing",
                &Error::MissingDependency { capability: "significance testing" },
            )?;
        }
        writeln!(
            out,
            "Skipped {} samples with an unknown response and {} with no cells",
            comparison.summary.skipped_label(),
            comparison.summary.skipped_empty()
        )?;
        write_comparison_csv(&comparison.rows, &mut *out)?;
        let plot_path = resolve_path(&self.config.plot_output);
        match self
            .renderer
            .render(&comparison.summary, &self.config.populations, &plot_path)
        {
            Ok(()) => writeln!(out, "Box plot: {}", plot_path.display())?,
            Err(e @ (Error::MissingDependency { .. } | Error::Plot(_))) => {
                skip_notice(out, "the responder box plot", &e)?
            }
            Err(e) => return Err(e),
        }

        // ── 4) Baseline subset ──
        section(out, "Baseline subset")?;
        let subset = fetch_baseline(self.store, self.config)?;
        if subset.is_empty() {
            writeln!(out, "warning: no samples match the baseline subset")?;
        } else {
            writeln!(out, "Samples: {}", subset.sample_count())?;
            writeln!(out, "Subjects: {}", subset.subject_count)?;
            write_counts(out, "Samples per project", &subset.samples_per_project)?;
            write_counts(out, "Subjects per response", &subset.subjects_per_response)?;
            write_counts(out, "Subjects per sex", &subset.subjects_per_sex)?;
            writeln!(
                out,
                "Baseline sample details (first {} rows):",
                options.preview_rows.min(subset.sample_count())
            )?;
            subset.write_preview(options.preview_rows, &mut *out)?;
        }

        out.flush()?;
        Ok(())
    }
}

fn section<W: Write>(out: &mut W, title: &str) -> Result<()> {
    writeln!(out, "\n== {title} ==")?;
    Ok(())
}

fn text(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn write_frequency_line<W: Write>(out: &mut W, row: &FrequencyRow) -> Result<()> {
    writeln!(
        out,
        "{},{},{},{},{:.2}",
        row.sample, row.total_count, row.population, row.count, row.percentage
    )?;
    Ok(())
}

fn write_counts<W: Write>(out: &mut W, title: &str, counts: &[(String, i64)]) -> Result<()> {
    writeln!(out, "{title}:")?;
    for (key, n) in counts {
        writeln!(out, "  {key}: {n}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handling::store::fixtures::{row, store_in};

    fn render_to_string(dashboard: &Dashboard, options: &DashboardOptions) -> String {
        let mut out = Vec::new();
        dashboard.render(options, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn snapshot_is_loaded_once() {
        let dir = tempfile::tempdir().unwrap();
        let (_, store) = store_in(&dir, &[row("s1", Some("yes"), "PBMC", [1, 2, 3, 4, 5])]);
        let cache = SnapshotCache::new();
        assert!(!cache.is_loaded());
        assert_eq!(cache.get_or_load(&store).unwrap().len(), 1);

        store
            .replace_all(&[
                row("s1", Some("yes"), "PBMC", [1, 2, 3, 4, 5]),
                row("s2", Some("no"), "PBMC", [1, 2, 3, 4, 5]),
            ])
            .unwrap();
        assert_eq!(store.row_count().unwrap(), 2);
        assert_eq!(cache.get_or_load(&store).unwrap().len(), 1);
        assert!(cache.is_loaded());
    }

    #[test]
    fn failed_load_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let (config, _) = store_in(&dir, &[]);
        let missing = Config {
            database: dir.path().join("absent.db"),
            ..config
        };
        let store = CellCountStore::new(&missing).unwrap();
        let cache = SnapshotCache::new();
        assert!(cache.get_or_load(&store).is_err());
        assert!(!cache.is_loaded());
    }

    #[test]
    fn renders_all_four_sections() {
        let dir = tempfile::tempdir().unwrap();
        let (mut config, store) = store_in(
            &dir,
            &[
                row("S1", Some("yes"), "PBMC", [10, 20, 30, 20, 20]),
                row("S2", Some("no"), "PBMC", [20, 20, 20, 20, 20]),
                row("S3", Some("yes"), "WB", [90, 5, 5, 0, 0]),
            ],
        );
        config.plot_output = dir.path().join("plot.png");
        let cache = SnapshotCache::new();
        let dashboard = Dashboard::new(&config, &store, &cache)
            .with_capabilities(SignificanceTester::Unavailable, BoxPlotRenderer::Unavailable);
        let text = render_to_string(&dashboard, &DashboardOptions::default());

        assert!(text.contains("== Data management =="));
        assert!(text.contains("Total samples: 3"));
        assert!(text.contains("PBMC entries: 2"));
        assert!(text.contains("Sample S1:\nS1,100,b_cell,10,10.00\n"));
        assert!(text.contains("b_cell,10.00,20.00,-10.00,1,1,,n/a"));
        assert!(text.contains("warning: skipping the responder box plot"));
        assert!(text.contains("warning: skipping significance testing"));
        assert!(text.contains("== Baseline subset ==\nSamples: 2\nSubjects: 2\n"));
        assert!(text.contains("  prj1: 2"));
        assert!(text.contains("Baseline sample details (first 2 rows):\nsample,project,subject,"));
        assert!(text.contains("\nS1,prj1,sbj_S1,melanoma,miraclib,yes,F,60,PBMC,0,10,20,30,20,20\n"));
        assert!(text.contains("\nS2,prj1,sbj_S2,melanoma,miraclib,no,F,60,PBMC,0,20,20,20,20,20\n"));
        assert!(!text.contains(",WB,0,"));
        assert!(!config.plot_output.exists());
    }

    #[test]
    fn unknown_sample_and_empty_subset_warn() {
        let dir = tempfile::tempdir().unwrap();
        let (config, store) = store_in(&dir, &[row("S3", Some("yes"), "WB", [1, 1, 1, 1, 1])]);
        let cache = SnapshotCache::new();
        let dashboard = Dashboard::new(&config, &store, &cache)
            .with_capabilities(SignificanceTester::Unavailable, BoxPlotRenderer::Unavailable);
        let options = DashboardOptions { sample: Some("nope".into()), preview_rows: 2 };
        let text = render_to_string(&dashboard, &options);

        assert!(text.contains("warning: sample 'nope' not found"));
        assert!(text.contains("First 2 frequency rows:"));
        assert!(text.contains("warning: no samples match the baseline subset"));
    }
}
