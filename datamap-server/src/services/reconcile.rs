//! Generic set reconciliation
//!
//! Dictionary sync mirrors a remote collection into a local table. Instead
//! of ad-hoc insert/update/delete passes per entity, the planner diffs two
//! keyed sets once and the caller applies the plan.

use std::collections::HashMap;

/// Outcome of diffing an incoming set against an existing set
#[derive(Debug)]
pub struct ReconcilePlan<'a, E, I> {
    /// Incoming items with no existing counterpart
    pub to_insert: Vec<&'a I>,
    /// Key matches, paired existing/incoming for the caller to compare
    pub to_update: Vec<(&'a E, &'a I)>,
    /// Existing items absent from the incoming set
    pub to_delete: Vec<&'a E>,
}

/// Diff `incoming` against `existing` under the given key functions
///
/// Order of `to_insert`/`to_update` follows the incoming set; `to_delete`
/// follows the existing set.
pub fn reconcile<'a, E, I, K, FE, FI>(
    existing: &'a [E],
    incoming: &'a [I],
    existing_key: FE,
    incoming_key: FI,
) -> ReconcilePlan<'a, E, I>
where
    K: std::hash::Hash + Eq,
    FE: Fn(&E) -> K,
    FI: Fn(&I) -> K,
{
    let existing_by_key: HashMap<K, &E> =
        existing.iter().map(|e| (existing_key(e), e)).collect();

    let mut to_insert = Vec::new();
    let mut to_update = Vec::new();
    let mut matched = Vec::new();

    for item in incoming {
        let key = incoming_key(item);
        match existing_by_key.get(&key) {
            Some(existing_item) => {
                to_update.push((*existing_item, item));
                matched.push(key);
            }
            None => to_insert.push(item),
        }
    }

    let matched: std::collections::HashSet<K> = matched.into_iter().collect();
    let to_delete = existing
        .iter()
        .filter(|e| !matched.contains(&existing_key(e)))
        .collect();

    ReconcilePlan { to_insert, to_update, to_delete }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_partitions_by_key() {
        let existing = vec!["lab", "pharmacy", "retired"];
        let incoming = vec!["lab", "enrolments"];

        let plan = reconcile(&existing, &incoming, |e| e.to_string(), |i| i.to_string());

        assert_eq!(plan.to_insert, vec![&"enrolments"]);
        assert_eq!(plan.to_update.len(), 1);
        assert_eq!(*plan.to_update[0].0, "lab");
        assert_eq!(plan.to_delete, vec![&"pharmacy", &"retired"]);
    }

    #[test]
    fn empty_existing_inserts_everything() {
        let existing: Vec<String> = vec![];
        let incoming = vec!["a".to_string(), "b".to_string()];

        let plan = reconcile(&existing, &incoming, |e| e.clone(), |i| i.clone());
        assert_eq!(plan.to_insert.len(), 2);
        assert!(plan.to_update.is_empty());
        assert!(plan.to_delete.is_empty());
    }

    #[test]
    fn empty_incoming_deletes_everything() {
        let existing = vec!["a", "b"];
        let incoming: Vec<&str> = vec![];

        let plan = reconcile(&existing, &incoming, |e| e.to_string(), |i| i.to_string());
        assert!(plan.to_insert.is_empty());
        assert_eq!(plan.to_delete.len(), 2);
    }
}
