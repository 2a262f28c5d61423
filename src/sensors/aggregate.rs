//! Pure derivations over a sensor snapshot.
//!
//! Nothing here performs I/O or reads the clock: callers pass `now` in. Every
//! function borrows its input and returns a fresh value, so a snapshot shared
//! between requests is never modified.

use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    hash::Hash,
};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{
    models::{AlertLevel, Category, NumericField, SensorRecord, WaterLevel},
    window::TimeWindow,
};

/// Default freshness window: a sensor silent for this long is inactive.
pub const FRESHNESS_WINDOW: TimeDelta = TimeDelta::hours(24);

// ---------------------------------------------------------------------------
// Deduplication and grouping
// ---------------------------------------------------------------------------

/// Keep one record per `id`.
///
/// When an id repeats, the occurrence that arrives **last** wins, matching an
/// upstream feed that appends updates. The result lists ids in the order they
/// first appeared.
pub fn deduplicate(records: &[SensorRecord]) -> Vec<SensorRecord> {
    let mut slots: HashMap<&str, usize> = HashMap::with_capacity(records.len());
    let mut out: Vec<SensorRecord> = Vec::with_capacity(records.len());

    for record in records {
        match slots.get(record.id.as_str()) {
            Some(&slot) => out[slot] = record.clone(),
            None => {
                slots.insert(record.id.as_str(), out.len());
                out.push(record.clone());
            }
        }
    }
    out
}

/// Count records per key, in order of each key's first occurrence.
pub fn count_by<K, F>(records: &[SensorRecord], key: F) -> Vec<(K, usize)>
where
    K: Eq + Hash + Clone,
    F: Fn(&SensorRecord) -> K,
{
    let mut slots: HashMap<K, usize> = HashMap::new();
    let mut counts: Vec<(K, usize)> = Vec::new();

    for record in records {
        let k = key(record);
        match slots.get(&k) {
            Some(&slot) => counts[slot].1 += 1,
            None => {
                slots.insert(k.clone(), counts.len());
                counts.push((k, 1));
            }
        }
    }
    counts
}

/// Records per category. Unrecognised tags were already folded into
/// `Category::Unknown` at ingestion, so they land in that bucket here.
pub fn group_by_category(records: &[SensorRecord]) -> Vec<(Category, usize)> {
    count_by(records, |r| r.category)
}

/// Distinct locations with their record counts. Records without a location
/// are not counted.
pub fn locations(records: &[SensorRecord]) -> Vec<(String, usize)> {
    let located: Vec<SensorRecord> = filter_by(records, |r| r.location.is_some());
    count_by(&located, |r| r.location.clone().unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// A UI selection such as "only incubators" or "everything in Lago Sul".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selector {
    #[default]
    All,
    Category(Category),
    Location(String),
    AlertLevel(AlertLevel),
    WaterLevel(WaterLevel),
}

impl Selector {
    pub fn matches(&self, record: &SensorRecord) -> bool {
        match self {
            Self::All => true,
            Self::Category(c) => record.category == *c,
            Self::Location(l) => record.location.as_deref() == Some(l.as_str()),
            Self::AlertLevel(a) => record.alert_level == *a,
            Self::WaterLevel(w) => record.water_level == Some(*w),
        }
    }
}

/// New vector of the records matching `selector`. The input is untouched.
pub fn filter(records: &[SensorRecord], selector: &Selector) -> Vec<SensorRecord> {
    filter_by(records, |r| selector.matches(r))
}

/// Records satisfying every selector.
pub fn filter_all(records: &[SensorRecord], selectors: &[Selector]) -> Vec<SensorRecord> {
    filter_by(records, |r| selectors.iter().all(|s| s.matches(r)))
}

pub fn filter_by<P>(records: &[SensorRecord], predicate: P) -> Vec<SensorRecord>
where
    P: Fn(&SensorRecord) -> bool,
{
    records.iter().filter(|r| predicate(r)).cloned().collect()
}

// ---------------------------------------------------------------------------
// Ordering and extremes
// ---------------------------------------------------------------------------

/// The `n` most recently updated records, newest first.
///
/// `sort_by` is stable, so records with equal `updated_at` keep their input
/// order.
pub fn most_recent(records: &[SensorRecord], n: usize) -> Vec<SensorRecord> {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    sorted.truncate(n);
    sorted
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Extremum {
    #[default]
    Max,
    Min,
}

/// Absent sorts below every real number.
fn rank(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// The record holding the largest (or smallest) value of `field`.
///
/// An absent value ranks below any real reading, so with `Max` a sensor with
/// no reading only wins when no sensor has one. With `Min` that same ranking
/// makes a sensor without a reading the minimum. Ties go to the earliest
/// record. `None` only for an empty input.
pub fn extreme_by(
    records: &[SensorRecord],
    field: NumericField,
    extremum: Extremum,
) -> Option<&SensorRecord> {
    let wanted = match extremum {
        Extremum::Max => Ordering::Greater,
        Extremum::Min => Ordering::Less,
    };

    let mut iter = records.iter();
    let mut best = iter.next()?;
    for record in iter {
        if rank(field.value(record), field.value(best)) == wanted {
            best = record;
        }
    }
    Some(best)
}

/// Largest present value of `field`, or `None` when no record has one.
pub fn max_value(records: &[SensorRecord], field: NumericField) -> Option<f64> {
    records
        .iter()
        .filter_map(|r| field.value(r))
        .max_by(|a, b| a.total_cmp(b))
}

// ---------------------------------------------------------------------------
// Freshness
// ---------------------------------------------------------------------------

/// `true` when the record reported less than `window` before `now`.
/// A record exactly `window` old is inactive.
pub fn is_active(record: &SensorRecord, now: DateTime<Utc>, window: TimeDelta) -> bool {
    now - record.updated_at < window
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Every report from sensor `id` whose `updated_at` falls in `window`,
/// oldest first. Takes the raw (non-deduplicated) feed, where repeated ids
/// are successive updates of the same sensor.
pub fn history(records: &[SensorRecord], id: &str, window: &TimeWindow) -> Vec<SensorRecord> {
    let mut points = filter_by(records, |r| r.id == id && window.contains(r.updated_at));
    points.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
    points
}

// ---------------------------------------------------------------------------
// Fleet summary
// ---------------------------------------------------------------------------

/// Headline numbers for the monitoring overview.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FleetSummary {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub info: usize,
    pub warning: usize,
    pub critical: usize,
    pub water_ok: usize,
    pub water_low: usize,
    pub locations: usize,
    /// Highest temperature reported, `None` when no sensor has a reading.
    pub max_temperature: Option<f64>,
}

pub fn summarize(records: &[SensorRecord], now: DateTime<Utc>, window: TimeDelta) -> FleetSummary {
    let count = |p: &dyn Fn(&SensorRecord) -> bool| records.iter().filter(|r| p(r)).count();

    let active = count(&|r| is_active(r, now, window));
    let distinct_locations: HashSet<&str> =
        records.iter().filter_map(|r| r.location.as_deref()).collect();

    FleetSummary {
        total: records.len(),
        active,
        inactive: records.len() - active,
        info: count(&|r| r.alert_level == AlertLevel::Info),
        warning: count(&|r| r.alert_level == AlertLevel::Warning),
        critical: count(&|r| r.alert_level == AlertLevel::Critical),
        water_ok: count(&|r| r.water_level == Some(WaterLevel::Ok)),
        water_low: count(&|r| r.water_level == Some(WaterLevel::Low)),
        locations: distinct_locations.len(),
        max_temperature: max_value(records, NumericField::Temperature),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::sensors::window::TimeRange;

    pub(crate) fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    pub(crate) fn make_record(id: &str, category: Category, updated_ms: i64) -> SensorRecord {
        SensorRecord {
            id: id.to_owned(),
            category,
            location: None,
            temperature: None,
            water_level: None,
            humidity: None,
            pressure: None,
            ammonia: None,
            alert_level: AlertLevel::None,
            message: None,
            activation_count: None,
            created_at: None,
            updated_at: t0() + TimeDelta::milliseconds(updated_ms),
        }
    }

    fn with_temp(mut r: SensorRecord, t: Option<f64>) -> SensorRecord {
        r.temperature = t;
        r
    }

    fn ids(records: &[SensorRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    // --- deduplicate ----------------------------------------------------------

    #[test]
    fn deduplicate_empty_is_empty() {
        assert!(deduplicate(&[]).is_empty());
    }

    #[test]
    fn deduplicate_last_occurrence_wins() {
        let records = vec![
            make_record("a", Category::Enclosure, 1),
            make_record("a", Category::Enclosure, 2),
        ];
        let out = deduplicate(&records);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].updated_at, t0() + TimeDelta::milliseconds(2));
    }

    #[test]
    fn deduplicate_later_wins_even_if_older_timestamp() {
        let records = vec![
            make_record("a", Category::Enclosure, 50),
            make_record("a", Category::Incubator, 10),
        ];
        let out = deduplicate(&records);
        assert_eq!(out[0].category, Category::Incubator);
    }

    #[test]
    fn deduplicate_keeps_first_appearance_order_and_unique_ids() {
        let records = vec![
            make_record("b", Category::Enclosure, 1),
            make_record("a", Category::Enclosure, 2),
            make_record("b", Category::Incubator, 3),
            make_record("c", Category::Enclosure, 4),
            make_record("a", Category::Incubator, 5),
        ];
        let out = deduplicate(&records);
        assert!(out.len() <= records.len());
        assert_eq!(ids(&out), ["b", "a", "c"]);
        assert_eq!(out[0].category, Category::Incubator);
        assert_eq!(out[1].category, Category::Incubator);

        let unique: HashSet<&str> = out.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(unique.len(), out.len());
    }

    // --- grouping -------------------------------------------------------------

    #[test]
    fn group_by_category_counts() {
        let records = vec![
            make_record("1", Category::Enclosure, 0),
            make_record("2", Category::Enclosure, 0),
            make_record("3", Category::Incubator, 0),
        ];
        assert_eq!(
            group_by_category(&records),
            vec![(Category::Enclosure, 2), (Category::Incubator, 1)]
        );
    }

    #[test]
    fn group_by_category_uses_first_occurrence_order_and_unknown_bucket() {
        let records = vec![
            make_record("1", Category::Incubator, 0),
            make_record("2", Category::Unknown, 0),
            make_record("3", Category::Enclosure, 0),
            make_record("4", Category::Incubator, 0),
        ];
        assert_eq!(
            group_by_category(&records),
            vec![
                (Category::Incubator, 2),
                (Category::Unknown, 1),
                (Category::Enclosure, 1),
            ]
        );
        assert!(group_by_category(&[]).is_empty());
    }

    #[test]
    fn locations_skip_records_without_location() {
        let mut a = make_record("1", Category::Enclosure, 0);
        a.location = Some("Lago Sul".into());
        let b = make_record("2", Category::Enclosure, 0);
        let mut c = make_record("3", Category::Enclosure, 0);
        c.location = Some("Lago Sul".into());

        assert_eq!(locations(&[a, b, c]), vec![("Lago Sul".to_owned(), 2)]);
    }

    // --- filter ---------------------------------------------------------------

    #[test]
    fn filter_does_not_mutate_input() {
        let records = vec![
            make_record("1", Category::Enclosure, 0),
            make_record("2", Category::Incubator, 0),
            make_record("3", Category::Enclosure, 0),
        ];
        let before = records.clone();

        let out = filter(&records, &Selector::Category(Category::Incubator));
        assert_eq!(ids(&out), ["2"]);
        assert_eq!(records, before);
    }

    #[test]
    fn filter_all_selector_returns_everything() {
        let records = vec![
            make_record("1", Category::Enclosure, 0),
            make_record("2", Category::Incubator, 0),
        ];
        assert_eq!(filter(&records, &Selector::All), records);
    }

    #[test]
    fn filter_all_combines_selectors() {
        let mut a = make_record("1", Category::Enclosure, 0);
        a.location = Some("Rio Principal".into());
        a.alert_level = AlertLevel::Critical;
        let mut b = make_record("2", Category::Enclosure, 0);
        b.location = Some("Rio Principal".into());
        let mut c = make_record("3", Category::Incubator, 0);
        c.alert_level = AlertLevel::Critical;

        let out = filter_all(
            &[a, b, c],
            &[
                Selector::Location("Rio Principal".into()),
                Selector::AlertLevel(AlertLevel::Critical),
            ],
        );
        assert_eq!(ids(&out), ["1"]);
    }

    #[test]
    fn water_level_selector_ignores_absent_levels() {
        let mut a = make_record("1", Category::Enclosure, 0);
        a.water_level = Some(WaterLevel::Low);
        let b = make_record("2", Category::Enclosure, 0);
        let out = filter(&[a, b], &Selector::WaterLevel(WaterLevel::Low));
        assert_eq!(ids(&out), ["1"]);
    }

    // --- most_recent ----------------------------------------------------------

    #[test]
    fn most_recent_sorts_descending_and_truncates() {
        let records = vec![
            make_record("old", Category::Enclosure, 1),
            make_record("new", Category::Enclosure, 3),
            make_record("mid", Category::Enclosure, 2),
        ];
        assert_eq!(ids(&most_recent(&records, 2)), ["new", "mid"]);
        assert_eq!(most_recent(&records, 10).len(), 3);
        assert!(most_recent(&records, 0).is_empty());
    }

    #[test]
    fn most_recent_ties_keep_input_order() {
        let records = vec![
            make_record("x", Category::Enclosure, 5),
            make_record("y", Category::Enclosure, 5),
            make_record("z", Category::Enclosure, 5),
        ];
        assert_eq!(ids(&most_recent(&records, 3)), ["x", "y", "z"]);
    }

    #[test]
    fn most_recent_is_idempotent() {
        let records: Vec<_> = (0..12)
            .map(|i| make_record(&format!("s{i}"), Category::Enclosure, (i * 7) % 5))
            .collect();
        let once = most_recent(&records, 5);
        assert_eq!(most_recent(&once, 5), once);
    }

    // --- extreme_by -----------------------------------------------------------

    #[test]
    fn extreme_by_empty_is_none() {
        assert!(extreme_by(&[], NumericField::Temperature, Extremum::Max).is_none());
    }

    #[test]
    fn extreme_by_skips_sentinel_for_max() {
        let records = vec![
            with_temp(make_record("empty", Category::Enclosure, 0), None),
            with_temp(make_record("real", Category::Enclosure, 0), Some(18.5)),
        ];
        let best = extreme_by(&records, NumericField::Temperature, Extremum::Max).unwrap();
        assert_eq!(best.id, "real");
    }

    #[test]
    fn extreme_by_absent_ranks_below_negative_values() {
        let records = vec![
            with_temp(make_record("absent", Category::Enclosure, 0), None),
            with_temp(make_record("freezing", Category::Enclosure, 0), Some(-4.0)),
        ];
        let max = extreme_by(&records, NumericField::Temperature, Extremum::Max).unwrap();
        assert_eq!(max.id, "freezing");
        let min = extreme_by(&records, NumericField::Temperature, Extremum::Min).unwrap();
        assert_eq!(min.id, "absent");
    }

    #[test]
    fn extreme_by_tie_goes_to_first() {
        let records = vec![
            with_temp(make_record("first", Category::Enclosure, 0), Some(30.0)),
            with_temp(make_record("second", Category::Enclosure, 0), Some(30.0)),
            with_temp(make_record("low", Category::Enclosure, 0), Some(10.0)),
        ];
        let max = extreme_by(&records, NumericField::Temperature, Extremum::Max).unwrap();
        assert_eq!(max.id, "first");

        let all_absent = vec![
            make_record("p", Category::Enclosure, 0),
            make_record("q", Category::Enclosure, 0),
        ];
        let max = extreme_by(&all_absent, NumericField::Temperature, Extremum::Max).unwrap();
        assert_eq!(max.id, "p");
    }

    #[test]
    fn extreme_by_min_over_present_values() {
        let records = vec![
            with_temp(make_record("a", Category::Enclosure, 0), Some(22.0)),
            with_temp(make_record("b", Category::Enclosure, 0), Some(19.5)),
            with_temp(make_record("c", Category::Enclosure, 0), Some(25.0)),
        ];
        let min = extreme_by(&records, NumericField::Temperature, Extremum::Min).unwrap();
        assert_eq!(min.id, "b");
    }

    #[test]
    fn max_value_ignores_absent() {
        let records = vec![
            with_temp(make_record("a", Category::Enclosure, 0), None),
            with_temp(make_record("b", Category::Enclosure, 0), Some(-2.0)),
        ];
        assert_eq!(max_value(&records, NumericField::Temperature), Some(-2.0));
        assert_eq!(max_value(&records[..1], NumericField::Temperature), None);
    }

    // --- freshness ------------------------------------------------------------

    #[test]
    fn freshness_boundary() {
        let now = t0() + TimeDelta::days(3);
        let mut r = make_record("a", Category::Enclosure, 0);

        r.updated_at = now - TimeDelta::milliseconds(86_399_999);
        assert!(is_active(&r, now, FRESHNESS_WINDOW));

        r.updated_at = now - TimeDelta::milliseconds(86_400_000);
        assert!(!is_active(&r, now, FRESHNESS_WINDOW));

        r.updated_at = now - TimeDelta::milliseconds(86_400_001);
        assert!(!is_active(&r, now, FRESHNESS_WINDOW));
    }

    #[test]
    fn freshness_respects_custom_window() {
        let mut r = make_record("a", Category::Enclosure, 0);
        let now = t0() + TimeDelta::minutes(10);
        r.updated_at = t0();
        assert!(!is_active(&r, now, TimeDelta::minutes(5)));
        assert!(is_active(&r, now, TimeDelta::minutes(15)));
    }

    // --- history --------------------------------------------------------------

    #[test]
    fn history_filters_by_id_and_window_oldest_first() {
        let hour = 3_600_000;
        let records = vec![
            make_record("s1", Category::Incubator, 3 * hour),
            make_record("s2", Category::Incubator, 2 * hour),
            make_record("s1", Category::Incubator, hour),
            make_record("s1", Category::Incubator, -2 * hour),
        ];
        let now = t0() + TimeDelta::hours(3);
        let window = TimeWindow::last(TimeRange::LastDay, now);
        let points = history(&records, "s1", &window);

        let times: Vec<_> = points.iter().map(|r| r.updated_at).collect();
        assert_eq!(
            times,
            [t0() - TimeDelta::hours(2), t0() + TimeDelta::hours(1), t0() + TimeDelta::hours(3)]
        );

        let narrow = TimeWindow::last(TimeRange::LastHour, now);
        assert_eq!(history(&records, "s1", &narrow).len(), 1);
        assert!(history(&records, "missing", &window).is_empty());
    }

    // --- summary --------------------------------------------------------------

    #[test]
    fn summary_of_empty_snapshot() {
        let s = summarize(&[], t0(), FRESHNESS_WINDOW);
        assert_eq!(s.total, 0);
        assert_eq!(s.active, 0);
        assert_eq!(s.max_temperature, None);
    }

    #[test]
    fn summary_counts_everything() {
        let now = t0();
        let mut a = with_temp(make_record("a", Category::Enclosure, 0), Some(31.0));
        a.alert_level = AlertLevel::Critical;
        a.water_level = Some(WaterLevel::Low);
        a.location = Some("Lago Norte".into());

        let mut b = with_temp(make_record("b", Category::Incubator, -90_000_000), None);
        b.alert_level = AlertLevel::Warning;
        b.water_level = Some(WaterLevel::Ok);
        b.location = Some("Lago Sul".into());

        let mut c = with_temp(make_record("c", Category::Enclosure, -1000), Some(24.0));
        c.location = Some("Lago Norte".into());

        let s = summarize(&[a, b, c], now, FRESHNESS_WINDOW);
        assert_eq!(
            s,
            FleetSummary {
                total: 3,
                active: 2,
                inactive: 1,
                info: 0,
                warning: 1,
                critical: 1,
                water_ok: 1,
                water_low: 1,
                locations: 2,
                max_temperature: Some(31.0),
            }
        );
    }

    // --- end to end -----------------------------------------------------------

    #[test]
    fn dedup_then_group_collapses_duplicate_incubator() {
        let mut records: Vec<_> = (0..130)
            .map(|i| make_record(&format!("enc-{i}"), Category::Enclosure, i))
            .collect();
        for i in 0..3 {
            records.push(make_record(&format!("inc-{i}"), Category::Incubator, 200 + i));
        }
        // Second update from inc-1.
        records.push(make_record("inc-1", Category::Incubator, 500));
        assert_eq!(records.len(), 134);

        let counts = group_by_category(&deduplicate(&records));
        assert_eq!(counts, vec![(Category::Enclosure, 130), (Category::Incubator, 3)]);
    }
}
