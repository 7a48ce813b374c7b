use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Commands run within this trailing window sort ahead of everything else.
pub const RECENT_WINDOW_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub invocation_count: u64,
    pub last_invoked_at: Option<DateTime<Utc>>,
}

impl UsageRecord {
    fn is_recent(&self, now: DateTime<Utc>) -> bool {
        self.last_invoked_at
            .map(|at| now.signed_duration_since(at).num_seconds() <= RECENT_WINDOW_SECS)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageLedger {
    records: BTreeMap<String, UsageRecord>,
}

impl UsageLedger {
    pub fn record_invocation(&mut self, name: &str, now: DateTime<Utc>) {
        let record = self.records.entry(name.to_string()).or_default();
        record.invocation_count = record.invocation_count.saturating_add(1);
        record.last_invoked_at = Some(now);
    }

    pub fn get(&self, name: &str) -> Option<&UsageRecord> {
        self.records.get(name)
    }

    pub(crate) fn insert(&mut self, name: String, record: UsageRecord) {
        self.records.insert(name, record);
    }

    pub fn retain_known<'a>(&mut self, known: impl IntoIterator<Item = &'a str>) -> usize {
        let known: Vec<&str> = known.into_iter().collect();
        let before = self.records.len();
        self.records.retain(|name, _| known.contains(&name.as_str()));
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn rank<T>(&self, items: &mut [T], name_of: impl Fn(&T) -> &str, now: DateTime<Utc>) {
        items.sort_by(|a, b| self.compare(name_of(a), name_of(b), now));
    }

    fn compare(&self, a: &str, b: &str, now: DateTime<Utc>) -> Ordering {
        let empty = UsageRecord::default();
        let ra = self.records.get(a).unwrap_or(&empty);
        let rb = self.records.get(b).unwrap_or(&empty);
        rb.is_recent(now)
            .cmp(&ra.is_recent(now))
            .then_with(|| rb.invocation_count.cmp(&ra.invocation_count))
            .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::{UsageLedger, RECENT_WINDOW_SECS};
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn ranked(
        ledger: &UsageLedger,
        names: &[&'static str],
        now: chrono::DateTime<Utc>,
    ) -> Vec<&'static str> {
        let mut items = names.to_vec();
        ledger.rank(&mut items, |n| *n, now);
        items
    }

    #[test]
    fn record_increments_and_stamps() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let mut ledger = UsageLedger::default();
        ledger.record_invocation("help", now);
        ledger.record_invocation("help", now + Duration::seconds(3));
        let record = ledger.get("help").unwrap();
        assert_eq!(record.invocation_count, 2);
        assert_eq!(record.last_invoked_at, Some(now + Duration::seconds(3)));
    }

    #[test]
    fn equal_counts_fall_back_to_name() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let ledger = UsageLedger::default();
        assert_eq!(
            ranked(&ledger, &["reload", "Help", "contact"], now),
            vec!["contact", "Help", "reload"]
        );
    }

    #[test]
    fn recent_beats_frequent() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let mut ledger = UsageLedger::default();
        for _ in 0..20 {
            ledger.record_invocation("home", start);
        }
        let now = start + Duration::seconds(RECENT_WINDOW_SECS) + Duration::minutes(1);
        ledger.record_invocation("writings", now - Duration::seconds(10));

        assert_eq!(
            ranked(&ledger, &["home", "contact", "writings"], now),
            vec!["writings", "home", "contact"]
        );
    }

    #[test]
    fn within_recent_partition_count_wins() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let mut ledger = UsageLedger::default();
        ledger.record_invocation("a", now);
        ledger.record_invocation("b", now);
        ledger.record_invocation("b", now);
        assert_eq!(ranked(&ledger, &["a", "b", "c"], now), vec!["b", "a", "c"]);
    }

    #[test]
    fn retain_known_drops_stale_records() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let mut ledger = UsageLedger::default();
        ledger.record_invocation("help", now);
        ledger.record_invocation("gone", now);
        assert_eq!(ledger.retain_known(["help", "home"]), 1);
        assert!(ledger.get("gone").is_none());
        assert_eq!(ledger.len(), 1);
    }
}
