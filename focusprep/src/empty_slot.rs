//! Empty-slot identification, deduplication and scan ordering.
//!
//! Reference exposures are taken through an empty/clear wheel slot, marked by
//! an offset of 0 to the empty slot. A wheel may carry several such slots;
//! only one is needed, so duplicates whose names match the configured
//! empty-slot name set are pruned. Duplicates with unexpected names are kept
//! and flagged so a misconfigured wheel is visible in the logs.

use regex::RegexSet;
use tracing::{debug, info, warn};

use crate::entities::FilterWheel;
use crate::error::{DeviceError, DeviceResult};

/// Compiled empty-slot name set.
///
/// Patterns are compiled once per run and matched against the whole filter
/// name: a pattern `R` matches the filter `R` and never `R2`.
#[derive(Debug, Clone)]
pub struct EmptySlotPatterns {
    set: RegexSet,
}

impl EmptySlotPatterns {
    /// Compile the configured pattern set.
    pub fn compile(names: &[String]) -> DeviceResult<Self> {
        let anchored: Vec<String> = names.iter().map(|n| format!("^(?:{n})$")).collect();
        let set = RegexSet::new(&anchored).map_err(|e| {
            DeviceError::InvalidConfiguration(format!("bad empty-slot name pattern: {e}"))
        })?;
        Ok(Self { set })
    }

    /// Whether a filter name designates an empty slot.
    pub fn matches(&self, name: &str) -> bool {
        self.set.is_match(name)
    }
}

/// Resolve the empty slots of one wheel in use.
///
/// Collects the empty-offset candidates in configured order, always retains
/// the first, and drops each later candidate from the wheel iff its name
/// matches the pattern set. Returns the names of retained duplicates that did
/// not match any pattern (unresolved, kept for diagnostics).
///
/// Fails with `MissingEmptySlot` when the wheel has no candidate at all.
pub fn resolve_empty_slots(
    wheel: &mut FilterWheel,
    patterns: &EmptySlotPatterns,
) -> DeviceResult<Vec<String>> {
    let candidates: Vec<String> = wheel
        .filters
        .iter()
        .filter(|ft| ft.is_empty_slot())
        .map(|ft| ft.name.clone())
        .collect();

    let Some(first) = candidates.first() else {
        warn!("{}: no empty slot found", wheel.name);
        return Err(DeviceError::MissingEmptySlot {
            wheel: wheel.name.clone(),
        });
    };
    info!("{}: empty slot: {}", wheel.name, first);

    let mut unresolved = Vec::new();
    for name in &candidates[1..] {
        if patterns.matches(name) {
            info!("{}: dropping duplicate empty slot: {}", wheel.name, name);
            wheel.filters.retain(|ft| ft.name != *name);
        } else {
            debug!(
                "{}: keeping slot {}, name matches no empty-slot pattern",
                wheel.name, name
            );
            unresolved.push(name.clone());
        }
    }

    if let Some(keeper) = wheel.filters.iter().find(|ft| ft.name == *first) {
        wheel.empty_slots.push(keeper.clone());
    }
    Ok(unresolved)
}

/// Order a wheel's filters for the scan: empty slots first, otherwise stable.
pub fn order_filters(wheel: &mut FilterWheel) {
    wheel.filters.sort_by_key(|ft| !ft.is_empty_slot());
}

/// Order wheels by descending filter count.
///
/// Scan-efficiency heuristic: the busiest wheel goes first so the emptier
/// wheels change position less often.
pub fn order_wheels(wheels: &mut [FilterWheel]) {
    wheels.sort_by_key(|wheel| std::cmp::Reverse(wheel.filters.len()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Filter;

    fn filter(name: &str, empty: bool) -> Filter {
        Filter {
            name: name.to_string(),
            offset_to_empty_slot: if empty { Some(0) } else { None },
            relative_lower_limit: -100,
            relative_upper_limit: 100,
            step_size: 20,
            exposure_factor: 1.0,
            foc_foff: Vec::new(),
        }
    }

    fn patterns(names: &[&str]) -> EmptySlotPatterns {
        let owned: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        EmptySlotPatterns::compile(&owned).unwrap()
    }

    #[test]
    fn test_match_is_exact() {
        let pats = patterns(&["R", "open"]);
        assert!(pats.matches("R"));
        assert!(pats.matches("open"));
        assert!(!pats.matches("R2"));
        assert!(!pats.matches("reopen"));
    }

    #[test]
    fn test_single_candidate_retained() {
        let mut wheel = FilterWheel::new(
            "W1",
            vec![filter("open", true), filter("R", false), filter("V", false)],
        );
        let unresolved = resolve_empty_slots(&mut wheel, &patterns(&["open"])).unwrap();
        assert!(unresolved.is_empty());
        assert_eq!(wheel.empty_slots.len(), 1);
        assert_eq!(wheel.empty_slots[0].name, "open");
        assert_eq!(wheel.filters.len(), 3);
    }

    #[test]
    fn test_duplicate_matching_pattern_is_dropped() {
        // scenario: clear1 and clear2 both empty, pattern matches clear2 only
        let mut wheel = FilterWheel::new(
            "W1",
            vec![filter("clear1", true), filter("clear2", true), filter("R", false)],
        );
        let unresolved = resolve_empty_slots(&mut wheel, &patterns(&["clear2"])).unwrap();
        assert!(unresolved.is_empty());
        assert_eq!(wheel.empty_slots.len(), 1);
        assert_eq!(wheel.empty_slots[0].name, "clear1");
        let names: Vec<&str> = wheel.filters.iter().map(|ft| ft.name.as_str()).collect();
        assert_eq!(names, vec!["clear1", "R"]);
    }

    #[test]
    fn test_all_matching_duplicates_leave_exactly_one() {
        let mut wheel = FilterWheel::new(
            "W1",
            vec![
                filter("open1", true),
                filter("open2", true),
                filter("open3", true),
                filter("R", false),
            ],
        );
        let unresolved =
            resolve_empty_slots(&mut wheel, &patterns(&["open1", "open2", "open3"])).unwrap();
        assert!(unresolved.is_empty());
        assert_eq!(
            wheel.filters.iter().filter(|ft| ft.is_empty_slot()).count(),
            1
        );
        assert_eq!(wheel.empty_slots.len(), 1);
    }

    #[test]
    fn test_unmatched_duplicate_is_kept_and_flagged() {
        let mut wheel = FilterWheel::new(
            "W1",
            vec![filter("open", true), filter("pinhole", true)],
        );
        let unresolved = resolve_empty_slots(&mut wheel, &patterns(&["open"])).unwrap();
        assert_eq!(unresolved, vec!["pinhole".to_string()]);
        assert_eq!(wheel.filters.len(), 2);
        assert_eq!(wheel.empty_slots.len(), 1);
        assert_eq!(wheel.empty_slots[0].name, "open");
    }

    #[test]
    fn test_no_candidate_is_fatal() {
        let mut wheel = FilterWheel::new("W1", vec![filter("R", false), filter("V", false)]);
        let err = resolve_empty_slots(&mut wheel, &patterns(&["open"])).unwrap_err();
        assert!(matches!(err, DeviceError::MissingEmptySlot { wheel } if wheel == "W1"));
    }

    #[test]
    fn test_filter_ordering_puts_empty_slots_first() {
        let mut wheel = FilterWheel::new(
            "W1",
            vec![filter("R", false), filter("open", true), filter("V", false)],
        );
        order_filters(&mut wheel);
        let names: Vec<&str> = wheel.filters.iter().map(|ft| ft.name.as_str()).collect();
        assert_eq!(names, vec!["open", "R", "V"]);
    }

    #[test]
    fn test_wheel_ordering_by_descending_filter_count() {
        let mut wheels = vec![
            FilterWheel::new("W1", vec![filter("open", true)]),
            FilterWheel::new(
                "W2",
                vec![filter("nof", true), filter("U", false), filter("B", false)],
            ),
        ];
        order_wheels(&mut wheels);
        assert_eq!(wheels[0].name, "W2");
        assert_eq!(wheels[1].name, "W1");
    }
}
