use serde::Serialize;

use crate::market::median;

use super::PriceSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSummary {
    pub direction: TrendDirection,
    pub change_percent: f64,
    pub sparkline: Vec<f64>,
    /// Smallest per-window median, not the raw minimum.
    pub lowest_median: Option<f64>,
    /// Largest per-window median, not the raw maximum.
    pub highest_median: Option<f64>,
    pub data_points: usize,
    pub latest_median: Option<f64>,
}

impl TrendSummary {
    pub fn neutral() -> Self {
        Self {
            direction: TrendDirection::Neutral,
            change_percent: 0.0,
            sparkline: Vec::new(),
            lowest_median: None,
            highest_median: None,
            data_points: 0,
            latest_median: None,
        }
    }
}

/// Indices `floor(i * len / max_points)` for `i in 0..max_points`, or every index when the
/// series already fits.
pub fn stride_indices(len: usize, max_points: usize) -> Vec<usize> {
    if max_points == 0 {
        return Vec::new();
    }
    if len <= max_points {
        return (0..len).collect();
    }
    (0..max_points).map(|i| i * len / max_points).collect()
}

/// Downsample `series` to at most `budget` points, always ending on the final value.
pub fn sparkline(series: &[f64], budget: usize) -> Vec<f64> {
    let mut indices = stride_indices(series.len(), budget);
    if let Some(last) = indices.last_mut() {
        *last = series.len() - 1;
    }
    indices.into_iter().map(|index| series[index]).collect()
}

/// Classify a chronologically ordered snapshot sequence.
///
/// The series is cut into eighths; the median of the first and of the last eighth are compared,
/// and the per-eighth medians form the low/high envelope.
pub fn summarize(
    snapshots: &[PriceSnapshot],
    threshold_pct: f64,
    sparkline_budget: usize,
) -> TrendSummary {
    let medians: Vec<f64> = snapshots.iter().map(|snap| snap.median_rate).collect();
    let mut summary = TrendSummary {
        sparkline: sparkline(&medians, sparkline_budget),
        data_points: medians.len(),
        latest_median: medians.last().copied(),
        ..TrendSummary::neutral()
    };

    if medians.len() < 2 {
        summary.lowest_median = summary.latest_median;
        summary.highest_median = summary.latest_median;
        return summary;
    }

    let window = (medians.len() / 8).max(1);
    let start = median(&medians[..window]).unwrap_or_default();
    let end = median(&medians[medians.len() - window..]).unwrap_or_default();

    let change_percent = if start == 0.0 {
        0.0
    } else {
        (end - start) / start * 100.0
    };

    summary.direction = if change_percent > threshold_pct {
        TrendDirection::Up
    } else if change_percent < -threshold_pct {
        TrendDirection::Down
    } else {
        TrendDirection::Neutral
    };
    summary.change_percent = (change_percent * 100.0).round() / 100.0;

    let envelope: Vec<f64> = medians.chunks(window).filter_map(median).collect();
    summary.lowest_median = envelope.iter().copied().reduce(f64::min);
    summary.highest_median = envelope.iter().copied().reduce(f64::max);
    summary
}
