//! Side-by-side box plots of responder vs non-responder relative frequencies,
//! one panel per population with a shared y-axis.
//!
//! Rendering is optional: builds without the `plot` feature get
//! [`BoxPlotRenderer::Unavailable`], which answers every request with
//! [`Error::MissingDependency`].

use std::path::Path;

use tracing::info;

use crate::analysis::summary::GroupSummary;
use crate::error::{Error, Result};
use crate::models::Population;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxPlotRenderer {
    #[cfg(feature = "plot")]
    Bitmap,
    Unavailable,
}

impl BoxPlotRenderer {
    pub fn from_build() -> Self {
        #[cfg(feature = "plot")]
        {
            BoxPlotRenderer::Bitmap
        }
        #[cfg(not(feature = "plot"))]
        {
            BoxPlotRenderer::Unavailable
        }
    }

    pub fn render(
        &self,
        summary: &GroupSummary,
        populations: &[Population],
        output_path: &Path,
    ) -> Result<()> {
        match self {
            #[cfg(feature = "plot")]
            BoxPlotRenderer::Bitmap => {
                crate::helper_functions::ensure_parent_dir(output_path)?;
                draw_panels(summary, populations, output_path)
                    .map_err(|e| Error::Plot(e.to_string()))?;
                info!("Saved {}", output_path.display());
                Ok(())
            }
            BoxPlotRenderer::Unavailable => {
                let _ = (summary, populations, output_path);
                Err(Error::MissingDependency { capability: "box plot rendering" })
            }
        }
    }
}

/// Lower and upper bound shared by every panel, padded a little so boxes
/// never touch the frame.
#[cfg_attr(not(feature = "plot"), allow(dead_code))]
fn shared_y_range(summary: &GroupSummary, populations: &[Population]) -> (f64, f64) {
    use crate::models::Response;

    let values = populations.iter().flat_map(|&p| {
        Response::ALL
            .into_iter()
            .flat_map(move |r| summary.group(r).values(p).iter().copied())
    });
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 100.0);
    }
    let pad = ((max - min) * 0.05).max(1.0);
    ((min - pad).max(0.0), (max + pad).min(100.0))
}

#[cfg(feature = "plot")]
fn draw_panels(
    summary: &GroupSummary,
    populations: &[Population],
    output_path: &Path,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    use plotters::prelude::*;

    use crate::models::Response;

    fn segment_label(v: &SegmentValue<&&str>) -> String {
        match v {
            SegmentValue::CenterOf(s) | SegmentValue::Exact(s) => s.to_string(),
            SegmentValue::Last => String::new(),
        }
    }

    let group_labels = Response::ALL.map(Response::display_name);
    let width = (populations.len() as u32 * 250).max(250);
    let root = BitMapBackend::new(output_path, (width, 500)).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(
        "Responder vs Non-responder PBMC population percentages",
        ("sans-serif", 20),
    )?;

    let (y_min, y_max) = shared_y_range(summary, populations);
    let panels = root.split_evenly((1, populations.len()));

    for (idx, (panel, &population)) in panels.iter().zip(populations).enumerate() {
        let mut chart = ChartBuilder::on(panel)
            .margin(10)
            .caption(population.column(), ("sans-serif", 16))
            .x_label_area_size(30)
            .y_label_area_size(if idx == 0 { 50 } else { 30 })
            .build_cartesian_2d(group_labels[..].into_segmented(), y_min as f32..y_max as f32)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_label_formatter(&segment_label)
            .y_desc(if idx == 0 { "Relative Frequency (%)" } else { "" })
            .draw()?;

        for (label, response) in group_labels.iter().zip(Response::ALL) {
            let values = summary.group(response).values(population);
            if values.is_empty() {
                continue;
            }
            let quartiles = Quartiles::new(values);
            let colour = match response {
                Response::Responder => RGBColor(34, 139, 34),
                Response::NonResponder => RGBColor(220, 110, 0),
            };
            chart.draw_series(std::iter::once(
                Boxplot::new_vertical(SegmentValue::CenterOf(label), &quartiles)
                    .width(30)
                    .whisker_width(0.5)
                    .style(colour),
            ))?;
        }
    }

    root.present()?;
    Ok(())
}
