use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The five immune-cell populations counted per sample, in schema order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Population {
    BCell,
    Cd8TCell,
    Cd4TCell,
    NkCell,
    Monocyte,
}

impl Population {
    pub const ALL: [Population; 5] = [
        Population::BCell,
        Population::Cd8TCell,
        Population::Cd4TCell,
        Population::NkCell,
        Population::Monocyte,
    ];

    /// Column name in the `cell_counts` relation and in every report.
    pub fn column(self) -> &'static str {
        match self {
            Population::BCell => "b_cell",
            Population::Cd8TCell => "cd8_t_cell",
            Population::Cd4TCell => "cd4_t_cell",
            Population::NkCell => "nk_cell",
            Population::Monocyte => "monocyte",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Population {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Population::ALL
            .into_iter()
            .find(|p| p.column() == s)
            .ok_or_else(|| format!("unknown population '{s}'"))
    }
}

/// Clinical response, the grouping variable of the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Response {
    Responder,
    NonResponder,
}

impl Response {
    pub const ALL: [Response; 2] = [Response::Responder, Response::NonResponder];

    /// Case-insensitive parse of the stored label. Anything outside
    /// `yes`/`no`, padded labels included, is not a response group.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "yes" => Some(Response::Responder),
            "no" => Some(Response::NonResponder),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Response::Responder => "Responder",
            Response::NonResponder => "Non-responder",
        }
    }
}

/// Raw per-population counts of one sample; nulls in the store become 0.
///
/// The five counts always sum within `u64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PopulationCounts([u64; 5]);

impl PopulationCounts {
    /// `None` when the sample total would not fit in a `u64`.
    pub fn new(
        b_cell: u64,
        cd8_t_cell: u64,
        cd4_t_cell: u64,
        nk_cell: u64,
        monocyte: u64,
    ) -> Option<Self> {
        let counts = [b_cell, cd8_t_cell, cd4_t_cell, nk_cell, monocyte];
        checked_total(&counts)?;
        Some(Self(counts))
    }

    pub fn get(&self, population: Population) -> u64 {
        self.0[population.index()]
    }

    /// Sum over all five populations, regardless of which ones are reported.
    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Population, u64)> + '_ {
        Population::ALL.into_iter().map(|p| (p, self.get(p)))
    }
}

pub fn checked_total(counts: &[u64]) -> Option<u64> {
    counts.iter().try_fold(0u64, |acc, &c| acc.checked_add(c))
}

/// One row of the `cell_counts` relation.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub project: Option<String>,
    pub subject: Option<String>,
    pub condition: Option<String>,
    pub age: Option<i64>,
    pub sex: Option<String>,
    pub treatment: Option<String>,
    pub response: Option<String>,
    pub sample: String,
    pub sample_type: Option<String>,
    pub time_from_treatment_start: Option<i64>,
    pub counts: PopulationCounts,
}

impl SampleRecord {
    /// Response group of this sample, if its label is a valid one.
    pub fn response_group(&self) -> Option<Response> {
        self.response.as_deref().and_then(Response::from_label)
    }
}
