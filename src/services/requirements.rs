// SPDX-License-Identifier: MIT

//! Requirement evaluation.
//!
//! Pure comparison of observed progress against a challenge's declared
//! requirements. Missing keys and variant mismatches are unsatisfied,
//! never errors; the function is total over well-formed inputs.

use crate::models::challenge::COMPLETED_KEY;
use crate::models::{Progress, Requirement};
use std::collections::BTreeMap;

/// Whether `progress` satisfies every entry of `requirements`.
///
/// An empty requirements map means the challenge completes via the
/// explicit `completed` flag alone.
pub fn requirements_satisfied(
    progress: &BTreeMap<String, Progress>,
    requirements: &BTreeMap<String, Requirement>,
) -> bool {
    if requirements.is_empty() {
        return matches!(progress.get(COMPLETED_KEY), Some(Progress::Flag(true)));
    }

    requirements.iter().all(|(key, requirement)| {
        match (requirement, progress.get(key)) {
            (Requirement::AtLeast(min), Some(Progress::Count(observed))) => observed >= min,
            (Requirement::Flag(expected), Some(Progress::Flag(observed))) => observed == expected,
            (Requirement::Includes(needed), Some(Progress::Items(observed))) => {
                needed.iter().all(|item| observed.contains(item))
            }
            // Missing key or mismatched variant.
            _ => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(v: f64) -> Progress {
        Progress::Count(v)
    }

    fn items(v: &[&str]) -> Progress {
        Progress::Items(v.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_numeric_threshold() {
        let requirements = BTreeMap::from([("minutes".to_string(), Requirement::AtLeast(10.0))]);

        let over = BTreeMap::from([("minutes".to_string(), count(15.0))]);
        assert!(requirements_satisfied(&over, &requirements));

        let exact = BTreeMap::from([("minutes".to_string(), count(10.0))]);
        assert!(requirements_satisfied(&exact, &requirements));

        let under = BTreeMap::from([("minutes".to_string(), count(5.0))]);
        assert!(!requirements_satisfied(&under, &requirements));
    }

    #[test]
    fn test_empty_requirements_use_completed_flag() {
        let requirements = BTreeMap::new();

        let done = BTreeMap::from([("completed".to_string(), Progress::Flag(true))]);
        assert!(requirements_satisfied(&done, &requirements));

        let not_done = BTreeMap::from([("completed".to_string(), Progress::Flag(false))]);
        assert!(!requirements_satisfied(&not_done, &requirements));

        assert!(!requirements_satisfied(&BTreeMap::new(), &requirements));
    }

    #[test]
    fn test_array_superset() {
        let requirements = BTreeMap::from([(
            "badges".to_string(),
            Requirement::Includes(vec!["a".to_string(), "b".to_string()]),
        )]);

        let superset = BTreeMap::from([("badges".to_string(), items(&["a", "b", "c"]))]);
        assert!(requirements_satisfied(&superset, &requirements));

        let missing = BTreeMap::from([("badges".to_string(), items(&["a"]))]);
        assert!(!requirements_satisfied(&missing, &requirements));
    }

    #[test]
    fn test_boolean_requirement() {
        let requirements = BTreeMap::from([("outside".to_string(), Requirement::Flag(true))]);

        let yes = BTreeMap::from([("outside".to_string(), Progress::Flag(true))]);
        assert!(requirements_satisfied(&yes, &requirements));

        let no = BTreeMap::from([("outside".to_string(), Progress::Flag(false))]);
        assert!(!requirements_satisfied(&no, &requirements));
    }

    #[test]
    fn test_missing_key_and_type_mismatch_unsatisfied() {
        let requirements = BTreeMap::from([("minutes".to_string(), Requirement::AtLeast(10.0))]);

        assert!(!requirements_satisfied(&BTreeMap::new(), &requirements));

        let mismatched = BTreeMap::from([("minutes".to_string(), Progress::Flag(true))]);
        assert!(!requirements_satisfied(&mismatched, &requirements));
    }

    #[test]
    fn test_all_requirements_must_hold() {
        let requirements = BTreeMap::from([
            ("minutes".to_string(), Requirement::AtLeast(10.0)),
            ("outside".to_string(), Requirement::Flag(true)),
        ]);

        let partial = BTreeMap::from([("minutes".to_string(), count(30.0))]);
        assert!(!requirements_satisfied(&partial, &requirements));

        let full = BTreeMap::from([
            ("minutes".to_string(), count(30.0)),
            ("outside".to_string(), Progress::Flag(true)),
        ]);
        assert!(requirements_satisfied(&full, &requirements));
    }
}
