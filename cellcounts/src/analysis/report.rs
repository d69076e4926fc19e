use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

use crate::analysis::significance::TestOutcome;
use crate::analysis::summary::GroupSummary;
use crate::error::Result;
use crate::models::{Population, Response};

pub const COMPARISON_HEADER: [&str; 8] = [
    "population",
    "responder_mean",
    "nonresponder_mean",
    "difference",
    "responder_samples",
    "nonresponder_samples",
    "p_value",
    "significant",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Significance {
    Yes,
    No,
    NotApplicable,
}

impl fmt::Display for Significance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Significance::Yes => "yes",
            Significance::No => "no",
            Significance::NotApplicable => "n/a",
        })
    }
}

/// Responder vs non-responder figures for one population.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub population: Population,
    pub responder_mean: f64,
    pub nonresponder_mean: f64,
    pub difference: f64,
    pub responder_samples: usize,
    pub nonresponder_samples: usize,
    pub p_value: Option<f64>,
    pub significant: Significance,
}

/// One row per population in `populations` order. `tests` is `None` when
/// significance testing is unavailable; affected cells render as empty / n/a.
pub fn comparison_rows(
    summary: &GroupSummary,
    tests: Option<&BTreeMap<Population, TestOutcome>>,
    populations: &[Population],
    threshold: f64,
) -> Vec<ComparisonRow> {
    let responders = summary.group(Response::Responder);
    let non_responders = summary.group(Response::NonResponder);

    populations
        .iter()
        .map(|&population| {
            let responder_mean = responders.mean(population);
            let nonresponder_mean = non_responders.mean(population);
            let p_value = tests
                .and_then(|t| t.get(&population))
                .and_then(TestOutcome::p_value);
            let significant = match p_value {
                Some(p) if p < threshold => Significance::Yes,
                Some(_) => Significance::No,
                None => Significance::NotApplicable,
            };
            ComparisonRow {
                population,
                responder_mean,
                nonresponder_mean,
                difference: responder_mean - nonresponder_mean,
                responder_samples: responders.sample_count(),
                nonresponder_samples: non_responders.sample_count(),
                p_value,
                significant,
            }
        })
        .collect()
}

impl ComparisonRow {
    pub fn formatted(&self) -> [String; 8] {
        [
            self.population.to_string(),
            format!("{:.2}", self.responder_mean),
            format!("{:.2}", self.nonresponder_mean),
            format!("{:.2}", self.difference),
            self.responder_samples.to_string(),
            self.nonresponder_samples.to_string(),
            self.p_value.map(|p| format!("{p:.4}")).unwrap_or_default(),
            self.significant.to_string(),
        ]
    }
}

pub fn write_comparison_csv<W: Write>(rows: &[ComparisonRow], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(COMPARISON_HEADER)?;
    for row in rows {
        writer.write_record(row.formatted())?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::frequency::tests::record;
    use crate::analysis::summary::summarize;

    fn csv_lines(rows: &[ComparisonRow]) -> Vec<String> {
        let mut out = Vec::new();
        write_comparison_csv(rows, &mut out).unwrap();
        String::from_utf8(out).unwrap().lines().map(str::to_string).collect()
    }

    #[test]
    fn single_sample_groups_render_not_applicable() {
        let summary = summarize(&[
            record("S1", Some("Yes"), [10, 20, 30, 20, 20]),
            record("S2", Some("no"), [20, 20, 20, 20, 20]),
        ]);
        let tests: BTreeMap<_, _> = Population::ALL
            .into_iter()
            .map(|p| (p, TestOutcome::Undefined))
            .collect();
        let rows = comparison_rows(&summary, Some(&tests), &Population::ALL, 0.05);
        let lines = csv_lines(&rows);

        assert_eq!(
            lines[0],
            "population,responder_mean,nonresponder_mean,difference,responder_samples,nonresponder_samples,p_value,significant"
        );
        assert_eq!(lines[1], "b_cell,10.00,20.00,-10.00,1,1,,n/a");
        assert_eq!(lines[3], "cd4_t_cell,30.00,20.00,10.00,1,1,,n/a");
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn significance_flag_follows_threshold() {
        let summary = summarize(&[record("S1", Some("yes"), [1, 1, 1, 1, 1])]);
        let mut tests = BTreeMap::new();
        tests.insert(Population::BCell, TestOutcome::Tested { statistic: 3.1, p_value: 0.0123 });
        tests.insert(Population::Cd8TCell, TestOutcome::Tested { statistic: 0.4, p_value: 0.05 });
        tests.insert(Population::Cd4TCell, TestOutcome::Undefined);

        let populations = [Population::BCell, Population::Cd8TCell, Population::Cd4TCell];
        let rows = comparison_rows(&summary, Some(&tests), &populations, 0.05);
        assert_eq!(rows[0].significant, Significance::Yes);
        assert_eq!(rows[1].significant, Significance::No);
        assert_eq!(rows[2].significant, Significance::NotApplicable);

        let lines = csv_lines(&rows);
        assert!(lines[1].ends_with(",0.0123,yes"));
        assert!(lines[2].ends_with(",0.0500,no"));
        assert!(lines[3].ends_with(",,n/a"));
    }

    #[test]
    fn missing_tests_keep_columns_empty() {
        let summary = summarize(&[]);
        let rows = comparison_rows(&summary, None, &[Population::Monocyte], 0.05);
        assert_eq!(csv_lines(&rows)[1], "monocyte,0.00,0.00,0.00,0,0,,n/a");
    }
}
