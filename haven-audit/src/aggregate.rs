//! k-anonymity aggregation
//!
//! **[KAN-SUP-010]** Reporting over sensitive records only ever leaves this
//! module in aggregate form, and any group smaller than k is suppressed
//! outright rather than partially reported. Suppression is a normal policy
//! outcome, not an error.

use haven_common::params::PARAMS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate over one group, or its suppression marker
///
/// `data` is `None` exactly when `suppressed` is true: a suppressed group
/// exposes its existence and the reason, never a partial aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult<T> {
    /// Aggregated value; None when suppressed
    pub data: Option<T>,
    /// Number of records in the group
    pub group_size: usize,
    /// True when the group was below the k threshold
    pub suppressed: bool,
    /// Why the group was suppressed
    pub suppression_reason: Option<String>,
}

/// **[KAN-SUP-010]** Group records and aggregate with k-anonymity suppression
///
/// Group sizes are recomputed from `records` on every call and results are
/// never cached, so a group that shrank below `k` since the last query is
/// suppressed on this one. `agg_fn` runs only for groups meeting the
/// threshold.
pub fn aggregate<R, T>(
    records: &[R],
    k: usize,
    group_fn: impl Fn(&R) -> String,
    agg_fn: impl Fn(&[&R]) -> T,
) -> BTreeMap<String, AggregateResult<T>> {
    let mut groups: BTreeMap<String, Vec<&R>> = BTreeMap::new();
    for record in records {
        groups.entry(group_fn(record)).or_default().push(record);
    }

    groups
        .into_iter()
        .map(|(key, members)| {
            let group_size = members.len();
            let result = if group_size < k {
                AggregateResult {
                    data: None,
                    group_size,
                    suppressed: true,
                    suppression_reason: Some(format!(
                        "group size {} below k={}",
                        group_size, k
                    )),
                }
            } else {
                AggregateResult {
                    data: Some(agg_fn(&members)),
                    group_size,
                    suppressed: false,
                    suppression_reason: None,
                }
            };
            (key, result)
        })
        .collect()
}

/// Count records per group with k-anonymity suppression
pub fn count_by_group<R>(
    records: &[R],
    k: usize,
    group_fn: impl Fn(&R) -> String,
) -> BTreeMap<String, AggregateResult<usize>> {
    aggregate(records, k, group_fn, |members| members.len())
}

/// The deployment-configured k threshold
///
/// See [KAN-PARAM-010] for range and default.
pub fn configured_k() -> usize {
    *PARAMS.k_anonymity_min_group.read().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row {
        group: &'static str,
        value: u32,
    }

    fn rows() -> Vec<Row> {
        // "north" has 5 members, "south" has 2
        vec![
            Row { group: "north", value: 1 },
            Row { group: "north", value: 2 },
            Row { group: "north", value: 3 },
            Row { group: "north", value: 4 },
            Row { group: "north", value: 5 },
            Row { group: "south", value: 10 },
            Row { group: "south", value: 20 },
        ]
    }

    #[test]
    fn test_small_group_suppressed_large_group_reported() {
        let data = rows();
        let results = aggregate(&data, 5, |r| r.group.to_string(), |members| {
            members.iter().map(|r| r.value).sum::<u32>()
        });

        let north = &results["north"];
        assert!(!north.suppressed);
        assert_eq!(north.data, Some(15));
        assert_eq!(north.group_size, 5);

        let south = &results["south"];
        assert!(south.suppressed);
        assert_eq!(south.data, None);
        assert_eq!(south.group_size, 2);
        assert!(south
            .suppression_reason
            .as_deref()
            .unwrap()
            .contains("below k=5"));
    }

    #[test]
    fn test_boundary_group_of_exactly_k_is_reported() {
        let data = rows();
        let results = count_by_group(&data, 5, |r| r.group.to_string());
        assert!(!results["north"].suppressed);
        assert_eq!(results["north"].data, Some(5));

        // One below k suppresses
        let results = count_by_group(&data[1..], 5, |r| r.group.to_string());
        assert!(results["north"].suppressed);
    }

    #[test]
    fn test_recomputed_on_every_call() {
        let mut data = rows();
        let before = count_by_group(&data, 5, |r| r.group.to_string());
        assert!(!before["north"].suppressed);

        // Group shrinks below k between queries
        data.retain(|r| r.group != "north" || r.value > 2);
        let after = count_by_group(&data, 5, |r| r.group.to_string());
        assert!(after["north"].suppressed);
        assert_eq!(after["north"].group_size, 3);
    }

    #[test]
    fn test_empty_input_yields_no_groups() {
        let data: Vec<Row> = Vec::new();
        let results = count_by_group(&data, 5, |r| r.group.to_string());
        assert!(results.is_empty());
    }
}
