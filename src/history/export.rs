use std::path::Path;

use crate::error::{Context, Result};

use super::PriceSnapshot;

/// Write a pair's snapshot history to `path` as CSV, oldest first.
pub fn write_history_csv<P: AsRef<Path>>(path: P, snapshots: &[PriceSnapshot]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV writer at {}", path.display()))?;

    writer.write_record(["timestamp", "best_rate", "avg_rate", "median_rate", "listing_count"])?;
    for snapshot in snapshots {
        writer.write_record(&[
            snapshot.timestamp.to_rfc3339(),
            snapshot.best_rate.to_string(),
            snapshot.avg_rate.to_string(),
            snapshot.median_rate.to_string(),
            snapshot.listing_count.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn writes_header_and_rows() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("history.csv");
        let snapshot = PriceSnapshot {
            timestamp: Utc::now(),
            best_rate: 1.5,
            avg_rate: 2.0,
            median_rate: 1.75,
            listing_count: 4,
        };

        write_history_csv(&path, &[snapshot.clone(), snapshot]).expect("export");

        let content = std::fs::read_to_string(&path).expect("read back");
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "timestamp,best_rate,avg_rate,median_rate,listing_count");
        assert!(lines[1].ends_with(",1.5,2,1.75,4"), "unexpected row: {}", lines[1]);
    }
}
