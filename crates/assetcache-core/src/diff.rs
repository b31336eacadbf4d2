//! Manifest comparison.
//!
//! Reports which asset names appeared or changed version between two
//! manifest snapshots. Removals are not reported.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::manifest::ManifestSnapshot;

/// Which names a diff reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffMode {
    /// New names followed by changed names.
    #[default]
    All,
    /// Names present only in the newer snapshot.
    New,
    /// Names present in both with a different version token.
    Changed,
}

impl DiffMode {
    /// Map a numeric mode code. Unknown codes mean [`DiffMode::All`].
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => DiffMode::New,
            2 => DiffMode::Changed,
            _ => DiffMode::All,
        }
    }
}

impl fmt::Display for DiffMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiffMode::All => "all",
            DiffMode::New => "new",
            DiffMode::Changed => "changed",
        })
    }
}

/// Error returned when parsing an unknown diff mode name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown diff mode: {0}")]
pub struct ParseDiffModeError(String);

impl FromStr for DiffMode {
    type Err = ParseDiffModeError;

    /// Accepts `all`, `new`, `changed` (any case) or a numeric code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<i64>() {
            return Ok(DiffMode::from_code(code));
        }
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(DiffMode::All),
            "new" => Ok(DiffMode::New),
            "changed" => Ok(DiffMode::Changed),
            _ => Err(ParseDiffModeError(s.to_owned())),
        }
    }
}

#[derive(Error, Debug)]
pub enum DiffError {
    /// A name passed the membership check but its record could not be found.
    #[error("Manifest integrity violation: record '{name}' vanished during diff")]
    Integrity { name: String },
}

/// Compare two snapshots.
///
/// With a `prefix`, only records whose prefix equals it take part. An empty
/// prefix selects names without a prefix, such as `_x`. The inputs are never
/// modified.
pub fn diff(
    old: &ManifestSnapshot,
    new: &ManifestSnapshot,
    mode: DiffMode,
    prefix: Option<&str>,
) -> Result<Vec<String>, DiffError> {
    let names = match prefix {
        Some(prefix) => {
            let old = old.filtered_by_prefix(prefix);
            let new = new.filtered_by_prefix(prefix);
            diff_unfiltered(&old, &new, mode)?
        }
        None => diff_unfiltered(old, new, mode)?,
    };
    debug!(%mode, ?prefix, count = names.len(), "Computed manifest diff");
    Ok(names)
}

fn diff_unfiltered(
    old: &ManifestSnapshot,
    new: &ManifestSnapshot,
    mode: DiffMode,
) -> Result<Vec<String>, DiffError> {
    match mode {
        DiffMode::New => Ok(compute_new(old, new)),
        DiffMode::Changed => compute_changed(old, new),
        DiffMode::All => {
            let mut names = compute_new(old, new);
            names.extend(compute_changed(old, new)?);
            Ok(names)
        }
    }
}

/// Names in `new` that `old` does not have, in `new`'s order.
pub fn compute_new(old: &ManifestSnapshot, new: &ManifestSnapshot) -> Vec<String> {
    let known = old.name_set();
    new.records()
        .iter()
        .filter(|r| !known.contains(r.name.as_str()))
        .map(|r| r.name.clone())
        .collect()
}

/// Names in both snapshots whose version token differs, in `new`'s order.
pub fn compute_changed(
    old: &ManifestSnapshot,
    new: &ManifestSnapshot,
) -> Result<Vec<String>, DiffError> {
    let known = old.name_set();
    let old_versions: HashMap<&str, &str> = old
        .records()
        .iter()
        .map(|r| (r.name.as_str(), r.version.as_str()))
        .collect();

    let mut changed = Vec::new();
    for record in new.records() {
        if !known.contains(record.name.as_str()) {
            continue;
        }
        let old_version =
            old_versions
                .get(record.name.as_str())
                .ok_or_else(|| DiffError::Integrity {
                    name: record.name.clone(),
                })?;
        if *old_version != record.version {
            changed.push(record.name.clone());
        }
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestRecord;
    use proptest::prelude::*;
    use std::collections::{BTreeMap, HashSet};

    fn snapshot(records: &[(&str, &str)]) -> ManifestSnapshot {
        records
            .iter()
            .map(|(name, version)| ManifestRecord::new(*name, *name, *version))
            .collect()
    }

    #[test]
    fn test_all_lists_new_then_changed() {
        let old = snapshot(&[("a_1", "1"), ("b_1", "1")]);
        let new = snapshot(&[("a_1", "2"), ("c_1", "1")]);

        assert_eq!(diff(&old, &new, DiffMode::All, None).unwrap(), vec!["c_1", "a_1"]);
        assert_eq!(diff(&old, &new, DiffMode::New, None).unwrap(), vec!["c_1"]);
        assert_eq!(diff(&old, &new, DiffMode::Changed, None).unwrap(), vec!["a_1"]);
    }

    #[test]
    fn test_identical_snapshots_have_no_diff() {
        let snap = snapshot(&[("a_1", "1"), ("b_2", "7")]);
        for mode in [DiffMode::All, DiffMode::New, DiffMode::Changed] {
            assert!(diff(&snap, &snap, mode, None).unwrap().is_empty());
        }
    }

    #[test]
    fn test_removed_names_are_not_reported() {
        let old = snapshot(&[("gone_1", "1"), ("kept_1", "1")]);
        let new = snapshot(&[("kept_1", "1")]);
        assert!(diff(&old, &new, DiffMode::All, None).unwrap().is_empty());
    }

    #[test]
    fn test_prefix_filter() {
        let old = snapshot(&[("charui_a", "1"), ("audio_x", "1")]);
        let new = snapshot(&[("charui_a", "2"), ("charui_b", "1"), ("audio_x", "2"), ("audio_y", "1")]);

        let names = diff(&old, &new, DiffMode::All, Some("charui")).unwrap();
        assert_eq!(names, vec!["charui_b", "charui_a"]);
        // Inputs untouched
        assert_eq!(new.len(), 4);
    }

    #[test]
    fn test_empty_prefix_selects_unprefixed_names() {
        let old = snapshot(&[("_base", "1")]);
        let new = snapshot(&[("a_1", "1"), ("_base", "2"), ("_extra", "1")]);
        assert_eq!(
            diff(&old, &new, DiffMode::All, Some("")).unwrap(),
            vec!["_extra", "_base"]
        );
        assert_eq!(diff(&old, &new, DiffMode::New, None).unwrap().len(), 2);
    }

    #[test]
    fn test_mode_codes_and_names() {
        assert_eq!(DiffMode::from_code(0), DiffMode::All);
        assert_eq!(DiffMode::from_code(1), DiffMode::New);
        assert_eq!(DiffMode::from_code(2), DiffMode::Changed);
        assert_eq!(DiffMode::from_code(42), DiffMode::All);
        assert_eq!("Changed".parse::<DiffMode>().unwrap(), DiffMode::Changed);
        assert_eq!("1".parse::<DiffMode>().unwrap(), DiffMode::New);
        assert!("removed".parse::<DiffMode>().is_err());
    }

    fn arb_snapshot() -> impl Strategy<Value = ManifestSnapshot> {
        prop::collection::btree_map("(ab|cd|ef)_[a-z]{1,3}", "[0-3]", 0..16).prop_map(
            |records: BTreeMap<String, String>| {
                records
                    .into_iter()
                    .map(|(name, version)| ManifestRecord::new(name.clone(), name, version))
                    .collect()
            },
        )
    }

    proptest! {
        #[test]
        fn prop_all_is_new_then_changed(old in arb_snapshot(), new in arb_snapshot()) {
            let all = diff(&old, &new, DiffMode::All, None).unwrap();
            let mut expected = diff(&old, &new, DiffMode::New, None).unwrap();
            expected.extend(diff(&old, &new, DiffMode::Changed, None).unwrap());
            prop_assert_eq!(&all, &expected);

            let unique: HashSet<&String> = all.iter().collect();
            prop_assert_eq!(unique.len(), all.len());
        }

        #[test]
        fn prop_prefix_filter_only_returns_prefix(old in arb_snapshot(), new in arb_snapshot()) {
            for name in diff(&old, &new, DiffMode::All, Some("cd")).unwrap() {
                prop_assert!(name.starts_with("cd_"));
            }
        }
    }
}
