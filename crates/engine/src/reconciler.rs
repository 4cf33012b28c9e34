use core_types::{Finding, FindingKey};
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Collapses findings that share a natural key.
///
/// The highest score wins; on a tie the first one seen is kept. Survivors keep
/// the order in which their key first appeared.
pub fn reconcile(findings: Vec<Finding>) -> Vec<Finding> {
    let mut slots: HashMap<FindingKey, usize> = HashMap::with_capacity(findings.len());
    let mut kept: Vec<Finding> = Vec::with_capacity(findings.len());

    for finding in findings {
        match slots.entry(finding.key()) {
            Entry::Vacant(slot) => {
                slot.insert(kept.len());
                kept.push(finding);
            }
            Entry::Occupied(slot) => {
                let current = &mut kept[*slot.get()];
                if finding.score() > current.score() {
                    *current = finding;
                }
            }
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_types::DetectionMethod;
    use serde_json::json;

    fn finding(symbol: &str, day: u32, method: DetectionMethod, score: f64, tag: &str) -> Finding {
        let ts = Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap();
        Finding::new(symbol, ts, method, score, json!({ "tag": tag })).unwrap()
    }

    #[test]
    fn higher_score_survives_a_collision() {
        let kept = reconcile(vec![
            finding("AAPL", 1, DetectionMethod::Zscore, 3.2, "low"),
            finding("AAPL", 1, DetectionMethod::Zscore, 4.8, "high"),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].details()["tag"], "high");
    }

    #[test]
    fn tie_keeps_first_seen() {
        let kept = reconcile(vec![
            finding("AAPL", 1, DetectionMethod::Iqr, 2.0, "first"),
            finding("AAPL", 1, DetectionMethod::Iqr, 2.0, "second"),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].details()["tag"], "first");
    }

    #[test]
    fn distinct_keys_are_untouched_and_ordered() {
        let input = vec![
            finding("AAPL", 2, DetectionMethod::Zscore, 1.0, "a"),
            finding("AAPL", 1, DetectionMethod::Zscore, 1.0, "b"),
            finding("AAPL", 1, DetectionMethod::Iqr, 1.0, "c"),
            finding("MSFT", 1, DetectionMethod::Zscore, 1.0, "d"),
        ];
        assert_eq!(reconcile(input.clone()), input);
    }
}
