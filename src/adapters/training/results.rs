//! Reader for the per-epoch `results.csv` the trainer writes next to its weights.

use std::collections::BTreeMap;
use std::path::Path;

use crate::domain::errors::DomainResult;

/// Metrics from the last epoch row, or `None` when the file is absent or empty.
pub async fn read_final_metrics(path: &Path) -> DomainResult<Option<BTreeMap<String, f64>>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(parse_last_row(&text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Header cells are trimmed (older trainer versions pad them); non-numeric cells are skipped.
pub fn parse_last_row(text: &str) -> Option<BTreeMap<String, f64>> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<&str> = lines.next()?.split(',').map(str::trim).collect();
    let last = lines.last()?;

    let metrics: BTreeMap<String, f64> = header
        .iter()
        .zip(last.split(','))
        .filter_map(|(name, cell)| Some((name.to_string(), cell.trim().parse::<f64>().ok()?)))
        .collect();

    (!metrics.is_empty()).then_some(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PADDED: &str = "\
                  epoch,      train/box_loss,   metrics/precision(B),      metrics/recall(B),       metrics/mAP50(B),    metrics/mAP50-95(B)
                      1,              1.4211,                0.31221,                0.28801,                0.21004,                0.12001
                      2,              1.2011,                0.45512,                0.40123,                0.38817,                0.22419
";

    #[test]
    fn takes_the_last_epoch_with_trimmed_headers() {
        let m = parse_last_row(PADDED).unwrap();
        assert_eq!(m["epoch"], 2.0);
        assert_eq!(m["metrics/mAP50(B)"], 0.38817);
        assert_eq!(m["metrics/mAP50-95(B)"], 0.22419);
        assert_eq!(m["metrics/precision(B)"], 0.45512);
    }

    #[test]
    fn header_only_has_no_metrics() {
        assert!(parse_last_row("epoch,metrics/mAP50(B)\n").is_none());
        assert!(parse_last_row("").is_none());
    }

    #[test]
    fn unparsable_cells_are_skipped() {
        let m = parse_last_row("epoch,note,metrics/recall(B)\n3,n/a,0.5\n").unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m["metrics/recall(B)"], 0.5);
    }

    #[tokio::test]
    async fn missing_file_is_not_an_error() {
        let got = read_final_metrics(Path::new("/nonexistent/results.csv")).await.unwrap();
        assert!(got.is_none());
    }
}
