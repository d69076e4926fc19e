use std::io::Write;

use crate::error::Result;
use crate::models::{Population, SampleRecord};

/// `count` as a percentage of `total`. A zero total yields 0.0 rather than
/// a division error.
pub fn relative_frequency(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// One (sample, population) line of the frequency report.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyRow {
    pub sample: String,
    pub total_count: u64,
    pub population: Population,
    pub count: u64,
    pub percentage: f64,
}

/// Long-format frequencies for every record. All-zero samples still appear,
/// with every percentage at 0.0.
pub fn frequency_rows(records: &[SampleRecord], populations: &[Population]) -> Vec<FrequencyRow> {
    let mut rows = Vec::with_capacity(records.len() * populations.len());
    for record in records {
        let total = record.counts.total();
        for &population in populations {
            let count = record.counts.get(population);
            rows.push(FrequencyRow {
                sample: record.sample.clone(),
                total_count: total,
                population,
                count,
                percentage: relative_frequency(count, total),
            });
        }
    }
    rows
}

pub fn write_frequency_csv<W: Write>(rows: &[FrequencyRow], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["sample", "total_count", "population", "count", "percentage"])?;
    for row in rows {
        writer.write_record([
            row.sample.clone(),
            row.total_count.to_string(),
            row.population.to_string(),
            row.count.to_string(),
            format!("{:.2}", row.percentage),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
