//! Splits samples into responders and non-responders and collects per-
//! population relative frequencies for each group.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::analysis::frequency::relative_frequency;
use crate::helper_functions::mean;
use crate::models::{Population, Response, SampleRecord};

/// Frequencies of one response group.
///
/// A sample contributes to every population or to none, so each list has
/// exactly `sample_count()` entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupStats {
    frequencies: BTreeMap<Population, Vec<f64>>,
    samples: BTreeSet<String>,
}

impl GroupStats {
    fn new() -> Self {
        Self {
            frequencies: Population::ALL.into_iter().map(|p| (p, Vec::new())).collect(),
            samples: BTreeSet::new(),
        }
    }

    pub fn values(&self, population: Population) -> &[f64] {
        self.frequencies
            .get(&population)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Mean relative frequency, 0.0 for an empty group.
    pub fn mean(&self, population: Population) -> f64 {
        mean(self.values(population))
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    #[cfg(test)]
    pub fn samples(&self) -> impl Iterator<Item = &str> {
        self.samples.iter().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    responder: GroupStats,
    non_responder: GroupStats,
    skipped_label: usize,
    skipped_empty: usize,
}

impl GroupSummary {
    pub fn group(&self, response: Response) -> &GroupStats {
        match response {
            Response::Responder => &self.responder,
            Response::NonResponder => &self.non_responder,
        }
    }

    fn group_mut(&mut self, response: Response) -> &mut GroupStats {
        match response {
            Response::Responder => &mut self.responder,
            Response::NonResponder => &mut self.non_responder,
        }
    }

    /// Records dropped for a response label outside yes/no.
    pub fn skipped_label(&self) -> usize {
        self.skipped_label
    }

    /// Records dropped because every population count was zero.
    pub fn skipped_empty(&self) -> usize {
        self.skipped_empty
    }
}

/// Groups `records` by response. Records are expected to be pre-filtered to a
/// single sample type.
pub fn summarize(records: &[SampleRecord]) -> GroupSummary {
    let mut summary = GroupSummary {
        responder: GroupStats::new(),
        non_responder: GroupStats::new(),
        skipped_label: 0,
        skipped_empty: 0,
    };

    for record in records {
        let Some(response) = record.response_group() else {
            summary.skipped_label += 1;
            continue;
        };
        let total = record.counts.total();
        if total == 0 {
            summary.skipped_empty += 1;
            continue;
        }

        let group = summary.group_mut(response);
        // A repeated sample id would break the list/sample-count invariant.
        if !group.samples.insert(record.sample.clone()) {
            debug!("Sample {} seen twice in one group; keeping the first", record.sample);
            continue;
        }
        for (population, count) in record.counts.iter() {
            group
                .frequencies
                .entry(population)
                .or_default()
                .push(relative_frequency(count, total));
        }
    }

    debug!(
        "Summarized {} responder and {} non-responder samples ({} invalid labels, {} empty)",
        summary.responder.sample_count(),
        summary.non_responder.sample_count(),
        summary.skipped_label,
        summary.skipped_empty
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::frequency::tests::record;

    #[test]
    fn lists_match_distinct_sample_counts() {
        let records = [
            record("a", Some("yes"), [1, 2, 3, 4, 5]),
            record("b", Some("YES"), [5, 4, 3, 2, 1]),
            record("c", Some("No"), [1, 1, 1, 1, 1]),
            record("d", Some("no"), [0, 0, 0, 0, 0]),
            record("e", Some("n/a"), [9, 9, 9, 9, 9]),
        ];
        let summary = summarize(&records);

        for response in Response::ALL {
            let group = summary.group(response);
            for p in Population::ALL {
                assert_eq!(group.values(p).len(), group.sample_count());
            }
        }
        assert_eq!(summary.group(Response::Responder).sample_count(), 2);
        assert_eq!(summary.group(Response::NonResponder).sample_count(), 1);
    }

    #[test]
    fn invalid_labels_and_empty_samples_are_excluded() {
        let records = [
            record("bad_label", Some("maybe"), [1, 1, 1, 1, 1]),
            record("no_label", None, [1, 1, 1, 1, 1]),
            record("zeros", Some("yes"), [0, 0, 0, 0, 0]),
            record("kept", Some("yes"), [2, 2, 2, 2, 2]),
        ];
        let summary = summarize(&records);

        let samples: Vec<&str> = Response::ALL
            .iter()
            .flat_map(|r| summary.group(*r).samples())
            .collect();
        assert_eq!(samples, ["kept"]);
        assert_eq!(summary.skipped_label(), 2);
        assert_eq!(summary.skipped_empty(), 1);
    }

    #[test]
    fn padded_labels_stay_out_of_both_groups() {
        let summary = summarize(&[
            record("s", Some(" yes "), [1, 1, 1, 1, 1]),
            record("t", Some("no "), [1, 1, 1, 1, 1]),
        ]);
        assert_eq!(summary.group(Response::Responder).sample_count(), 0);
        assert_eq!(summary.group(Response::NonResponder).sample_count(), 0);
        assert_eq!(summary.skipped_label(), 2);
    }

    #[test]
    fn means_and_empty_groups() {
        let records = [
            record("a", Some("yes"), [10, 20, 30, 20, 20]),
            record("b", Some("yes"), [30, 20, 10, 20, 20]),
        ];
        let summary = summarize(&records);

        let responders = summary.group(Response::Responder);
        assert!((responders.mean(Population::BCell) - 20.0).abs() < 1e-9);
        assert_eq!(responders.values(Population::BCell), &[10.0, 30.0]);

        let non = summary.group(Response::NonResponder);
        assert_eq!(non.sample_count(), 0);
        assert_eq!(non.mean(Population::BCell), 0.0);
    }

    #[test]
    fn duplicate_sample_ids_count_once() {
        let records = [
            record("a", Some("yes"), [1, 1, 1, 1, 1]),
            record("a", Some("yes"), [4, 1, 1, 1, 1]),
        ];
        let summary = summarize(&records);
        let group = summary.group(Response::Responder);
        assert_eq!(group.sample_count(), 1);
        assert_eq!(group.values(Population::Monocyte).len(), 1);
    }
}
