//! Welch's unequal-variance t-test per population.
//!
//! Testing is an optional capability: builds without the `ttest` feature get
//! [`SignificanceTester::Unavailable`] and the reports carry empty p-values.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::analysis::summary::GroupSummary;
use crate::models::{Population, Response};

/// Result of comparing one population between the two groups.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TestOutcome {
    Tested { statistic: f64, p_value: f64 },
    /// Fewer than two samples in a group, or no spread to test against.
    Undefined,
}

impl TestOutcome {
    pub fn p_value(&self) -> Option<f64> {
        match self {
            TestOutcome::Tested { p_value, .. } => Some(*p_value),
            TestOutcome::Undefined => None,
        }
    }

    pub fn statistic(&self) -> Option<f64> {
        match self {
            TestOutcome::Tested { statistic, .. } => Some(*statistic),
            TestOutcome::Undefined => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignificanceTester {
    #[cfg(feature = "ttest")]
    Welch,
    Unavailable,
}

impl SignificanceTester {
    pub fn from_build() -> Self {
        #[cfg(feature = "ttest")]
        {
            SignificanceTester::Welch
        }
        #[cfg(not(feature = "ttest"))]
        {
            SignificanceTester::Unavailable
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, SignificanceTester::Unavailable)
    }

    /// Compares two samples. `None` means testing is not available at all.
    pub fn compare(&self, a: &[f64], b: &[f64]) -> Option<TestOutcome> {
        match self {
            #[cfg(feature = "ttest")]
            SignificanceTester::Welch => Some(welch_t_test(a, b)),
            SignificanceTester::Unavailable => {
                let _ = (a, b);
                None
            }
        }
    }

    /// Responders vs non-responders for each population. `None` when the
    /// capability is missing from this build.
    pub fn run(
        &self,
        summary: &GroupSummary,
        populations: &[Population],
    ) -> Option<BTreeMap<Population, TestOutcome>> {
        if !self.is_available() {
            warn!("Significance testing not available in this build; p-values left empty");
            return None;
        }
        let responders = summary.group(Response::Responder);
        let non_responders = summary.group(Response::NonResponder);

        populations
            .iter()
            .map(|&p| {
                let outcome = self.compare(responders.values(p), non_responders.values(p))?;
                debug!("{}: t = {:?}, p = {:?}", p, outcome.statistic(), outcome.p_value());
                Some((p, outcome))
            })
            .collect()
    }
}

/// Sample mean and unbiased variance.
#[cfg_attr(not(feature = "ttest"), allow(dead_code))]
fn mean_var(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var)
}

#[cfg(feature = "ttest")]
fn welch_t_test(a: &[f64], b: &[f64]) -> TestOutcome {
    use statrs::distribution::{ContinuousCDF, StudentsT};

    if a.len() < 2 || b.len() < 2 {
        return TestOutcome::Undefined;
    }
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let (mean1, var1) = mean_var(a);
    let (mean2, var2) = mean_var(b);

    let se1 = var1 / n1;
    let se2 = var2 / n2;
    let se_diff = (se1 + se2).sqrt();
    // Spread at rounding-noise level counts as none.
    if !(se_diff > f64::EPSILON * mean1.abs().max(mean2.abs()).max(1.0)) {
        return TestOutcome::Undefined;
    }
    let statistic = (mean1 - mean2) / se_diff;

    // Welch-Satterthwaite degrees of freedom
    let df = (se1 + se2).powi(2) / (se1.powi(2) / (n1 - 1.0) + se2.powi(2) / (n2 - 1.0));

    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => {
            let p_value = (2.0 * dist.sf(statistic.abs())).clamp(0.0, 1.0);
            TestOutcome::Tested { statistic, p_value }
        }
        Err(e) => {
            debug!("t distribution with df={} rejected: {}", df, e);
            TestOutcome::Undefined
        }
    }
}
