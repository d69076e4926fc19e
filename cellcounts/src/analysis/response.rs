//! Responder vs non-responder comparison: summarize, test, report.
//!
//! Every presentation (CSV, box plot, dashboard) consumes the same
//! [`ResponseComparison`].

use std::collections::BTreeMap;

use tracing::info;

use crate::analysis::report::{comparison_rows, ComparisonRow};
use crate::analysis::significance::{SignificanceTester, TestOutcome};
use crate::analysis::summary::{summarize, GroupSummary};
use crate::config::Config;
use crate::data_handling::store::{CellCountStore, Filter, FilterColumn};
use crate::error::Result;
use crate::models::{Population, SampleRecord};

#[derive(Debug, Clone)]
pub struct ResponseComparison {
    pub summary: GroupSummary,
    pub tests: Option<BTreeMap<Population, TestOutcome>>,
    pub rows: Vec<ComparisonRow>,
}

/// Samples of the configured specimen type, ordered by sample id.
pub fn fetch_comparison_records(store: &CellCountStore, config: &Config) -> Result<Vec<SampleRecord>> {
    store.fetch(&Filter::new().eq_text(FilterColumn::SampleType, config.sample_type.as_str()))
}

/// Runs the comparison over records already restricted to one sample type.
pub fn compare_records(
    records: &[SampleRecord],
    config: &Config,
    tester: SignificanceTester,
) -> ResponseComparison {
    let summary = summarize(records);
    let tests = tester.run(&summary, &config.populations);
    let rows = comparison_rows(
        &summary,
        tests.as_ref(),
        &config.populations,
        config.significance_threshold,
    );
    info!(
        "Compared {} populations across {} records",
        rows.len(),
        records.len()
    );
    ResponseComparison { summary, tests, rows }
}

pub fn compare_responses(
    store: &CellCountStore,
    config: &Config,
    tester: SignificanceTester,
) -> Result<ResponseComparison> {
    let records = fetch_comparison_records(store, config)?;
    Ok(compare_records(&records, config, tester))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::frequency::{frequency_rows, write_frequency_csv};
    use crate::analysis::report::{write_comparison_csv, Significance};
    use crate::data_handling::store::fixtures::{row, store_in};
    use crate::models::Response;

    #[test]
    fn end_to_end_two_sample_example() {
        let dir = tempfile::tempdir().unwrap();
        let (config, store) = store_in(
            &dir,
            &[
                row("S1", Some("Yes"), "PBMC", [10, 20, 30, 20, 20]),
                row("S2", Some("no"), "PBMC", [20, 20, 20, 20, 20]),
                row("S3", Some("yes"), "WB", [90, 5, 5, 0, 0]),
            ],
        );

        let mut freq = Vec::new();
        let all = store.fetch_all().unwrap();
        write_frequency_csv(&frequency_rows(&all, &config.populations), &mut freq).unwrap();
        let freq = String::from_utf8(freq).unwrap();
        assert!(freq.contains("S1,100,b_cell,10,10.00\n"));
        assert!(freq.contains("S1,100,monocyte,20,20.00\n"));

        let comparison = compare_responses(&store, &config, SignificanceTester::from_build()).unwrap();
        let b_cell = &comparison.rows[0];
        assert_eq!(b_cell.population, Population::BCell);
        assert!((b_cell.responder_mean - 10.0).abs() < 1e-9);
        assert!((b_cell.nonresponder_mean - 20.0).abs() < 1e-9);
        assert!((b_cell.difference + 10.0).abs() < 1e-9);
        assert_eq!((b_cell.responder_samples, b_cell.nonresponder_samples), (1, 1));
        assert_eq!(b_cell.p_value, None);
        assert_eq!(b_cell.significant, Significance::NotApplicable);

        let mut out = Vec::new();
        write_comparison_csv(&comparison.rows, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().nth(1), Some("b_cell,10.00,20.00,-10.00,1,1,,n/a"));
    }

    #[cfg(feature = "ttest")]
    #[test]
    fn tests_run_once_groups_have_two_samples() {
        let dir = tempfile::tempdir().unwrap();
        let (config, store) = store_in(
            &dir,
            &[
                row("a", Some("yes"), "PBMC", [10, 20, 30, 20, 20]),
                row("b", Some("yes"), "PBMC", [11, 19, 30, 20, 20]),
                row("c", Some("yes"), "PBMC", [9, 21, 30, 20, 20]),
                row("d", Some("no"), "PBMC", [30, 20, 10, 20, 20]),
                row("e", Some("no"), "PBMC", [31, 21, 8, 20, 20]),
                row("f", Some("no"), "PBMC", [29, 19, 12, 20, 20]),
            ],
        );
        let comparison = compare_responses(&store, &config, SignificanceTester::Welch).unwrap();
        let tests = comparison.tests.as_ref().unwrap();
        assert_eq!(tests.len(), 5);
        assert_eq!(comparison.rows[0].significant, Significance::Yes);
        assert_eq!(comparison.summary.group(Response::Responder).sample_count(), 3);
    }

    #[test]
    fn unavailable_tester_still_reports_means() {
        let dir = tempfile::tempdir().unwrap();
        let (config, store) = store_in(
            &dir,
            &[
                row("a", Some("yes"), "PBMC", [1, 1, 1, 1, 1]),
                row("b", Some("yes"), "PBMC", [3, 1, 1, 1, 1]),
                row("c", Some("no"), "PBMC", [1, 1, 1, 1, 1]),
                row("d", Some("no"), "PBMC", [1, 3, 1, 1, 1]),
            ],
        );
        let comparison = compare_responses(&store, &config, SignificanceTester::Unavailable).unwrap();
        assert!(comparison.tests.is_none());
        assert_eq!(comparison.rows.len(), 5);
        assert!(comparison.rows.iter().all(|r| r.p_value.is_none()));
        assert!(comparison.rows.iter().all(|r| r.significant == Significance::NotApplicable));
    }
}
