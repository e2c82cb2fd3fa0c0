const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Block-character sparkline scaled between the series minimum and maximum.
pub fn sparkline_glyphs(values: &[f64]) -> String {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;

    values
        .iter()
        .map(|value| {
            if span <= f64::EPSILON {
                BARS[BARS.len() / 2]
            } else {
                let level = ((value - min) / span * (BARS.len() - 1) as f64).round() as usize;
                BARS[level.min(BARS.len() - 1)]
            }
        })
        .collect()
}

/// Fixed-width rate text: more decimals for small rates.
pub fn format_rate(rate: f64) -> String {
    if rate.abs() >= 100.0 {
        format!("{rate:.1}")
    } else if rate.abs() >= 1.0 {
        format!("{rate:.3}")
    } else {
        format!("{rate:.6}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparkline_spans_lowest_to_highest_bar() {
        assert_eq!(sparkline_glyphs(&[1.0, 2.0, 3.0]), "▁▅█");
        assert_eq!(sparkline_glyphs(&[5.0, 5.0]), "▅▅");
        assert_eq!(sparkline_glyphs(&[]), "");
    }

    #[test]
    fn rate_precision_depends_on_magnitude() {
        assert_eq!(format_rate(152.26), "152.3");
        assert_eq!(format_rate(2.5), "2.500");
        assert_eq!(format_rate(0.0066667), "0.006667");
    }
}
