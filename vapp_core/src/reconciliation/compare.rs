//! Reconciliation Compare Module
//!
//! Classifies declared entities against the previous baseline:
//!
//! - entries equal on both sides (ignoring computed fields) are **unchanged**
//! - of the rest, a declared-only and a previous-only entry sharing an identity
//!   (name, kind) collapse into one **modified** entry: the declared ordering wins,
//!   the previous computed fields are carried over
//! - remaining declared-only entries are **added**, previous-only are **removed**
//!
//! # Key Invariants
//!
//! - **Deterministic**: output order follows the input lists
//! - **Complete**: every identity in either list lands in exactly one category
//! - **Provenance-preserving**: a modified entry never loses the previous
//!   entry's computed fields

use std::collections::HashMap;

use vapp_shared_types::{EntityDescriptor, EntityIdentity};

/// Added, removed and modified entities of one update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationDelta {
    pub added: Vec<EntityDescriptor>,
    pub removed: Vec<EntityDescriptor>,
    pub modified: Vec<EntityDescriptor>,
    /// Present on both sides with the same attributes; carries the previous
    /// computed fields.
    pub unchanged: Vec<EntityDescriptor>,
}

/// Same declared attributes, computed fields ignored.
fn same_declaration(a: &EntityDescriptor, b: &EntityDescriptor) -> bool {
    a.name == b.name && a.kind == b.kind && a.folder == b.folder && a.ordering == b.ordering
}

pub fn diff(previous: &[EntityDescriptor], declared: &[EntityDescriptor]) -> ReconciliationDelta {
    let mut delta = ReconciliationDelta::default();

    let previous_by_identity: HashMap<EntityIdentity, &EntityDescriptor> =
        previous.iter().map(|e| (e.identity(), e)).collect();
    let declared_by_identity: HashMap<EntityIdentity, &EntityDescriptor> =
        declared.iter().map(|e| (e.identity(), e)).collect();

    for entity in declared {
        match previous_by_identity.get(&entity.identity()) {
            None => delta.added.push(entity.clone()),
            Some(prev) if same_declaration(prev, entity) => {
                let mut kept = entity.clone();
                kept.computed = prev.computed.clone();
                delta.unchanged.push(kept);
            }
            Some(prev) => {
                let mut modified = entity.clone();
                modified.computed = prev.computed.clone();
                delta.modified.push(modified);
            }
        }
    }

    for entity in previous {
        if !declared_by_identity.contains_key(&entity.identity()) {
            delta.removed.push(entity.clone());
        }
    }

    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use vapp_shared_types::{EntityKind, EntityOrdering, EntityProvenance};

    fn provenance(moid: &str) -> EntityProvenance {
        EntityProvenance {
            moid: moid.to_string(),
            folder_path: "/dc1/vm".to_string(),
            resource_pool_path: "/dc1/host/c1/Resources".to_string(),
        }
    }

    fn vm(name: &str, start_order: i32) -> EntityDescriptor {
        EntityDescriptor::new(name, EntityKind::VirtualMachine).with_ordering(EntityOrdering {
            start_order,
            ..Default::default()
        })
    }

    #[test]
    fn test_new_entity_is_added() {
        let delta = diff(&[], &[vm("vm-a", 0)]);
        assert_eq!(delta.added, vec![vm("vm-a", 0)]);
        assert!(delta.removed.is_empty());
        assert!(delta.modified.is_empty());
    }

    #[test]
    fn test_changed_ordering_is_modified_with_previous_provenance() {
        let previous = vec![vm("vm-a", 0).with_computed(provenance("vm-123"))];
        let declared = vec![vm("vm-a", 1)];

        let delta = diff(&previous, &declared);
        assert!(delta.added.is_empty());
        assert!(delta.removed.is_empty());
        assert_eq!(delta.modified.len(), 1);
        let modified = &delta.modified[0];
        assert_eq!(modified.ordering.start_order, 1);
        assert_eq!(modified.computed.as_ref().unwrap().moid, "vm-123");
    }

    #[test]
    fn test_same_name_different_kind_is_not_modified() {
        let previous = vec![vm("db", 0).with_computed(provenance("vm-1"))];
        let declared = vec![EntityDescriptor::new("db", EntityKind::VirtualApp)];

        let delta = diff(&previous, &declared);
        assert_eq!(delta.added.len(), 1);
        assert_eq!(delta.removed.len(), 1);
        assert!(delta.modified.is_empty());
    }

    #[test]
    fn test_unchanged_entity_keeps_provenance() {
        let previous = vec![vm("vm-a", 2).with_computed(provenance("vm-9"))];
        let delta = diff(&previous, &[vm("vm-a", 2)]);
        assert!(delta.added.is_empty() && delta.removed.is_empty() && delta.modified.is_empty());
        assert_eq!(delta.unchanged[0].computed.as_ref().unwrap().moid, "vm-9");
    }

    #[test]
    fn test_removed_entity_keeps_provenance() {
        let previous = vec![vm("vm-a", 0).with_computed(provenance("vm-1"))];
        let delta = diff(&previous, &[]);
        assert_eq!(delta.removed, previous);
    }

    fn arb_entity() -> impl Strategy<Value = EntityDescriptor> {
        (
            prop_oneof![Just("a"), Just("b"), Just("c"), Just("d"), Just("e")],
            prop_oneof![Just(EntityKind::VirtualMachine), Just(EntityKind::VirtualApp)],
            0i32..3,
            proptest::option::of("[a-z]{1,3}"),
        )
            .prop_map(|(name, kind, order, moid)| {
                let mut entity = EntityDescriptor::new(name, kind).with_ordering(EntityOrdering {
                    start_order: order,
                    ..Default::default()
                });
                entity.computed = moid.map(|m| provenance(&m));
                entity
            })
    }

    fn unique(entities: Vec<EntityDescriptor>) -> Vec<EntityDescriptor> {
        let mut seen = HashSet::new();
        entities
            .into_iter()
            .filter(|e| seen.insert(e.identity()))
            .collect()
    }

    proptest! {
        #[test]
        fn prop_diff_partitions_identities(
            previous in proptest::collection::vec(arb_entity(), 0..8).prop_map(unique),
            declared in proptest::collection::vec(arb_entity(), 0..8).prop_map(unique),
        ) {
            let declared: Vec<EntityDescriptor> = declared
                .into_iter()
                .map(|mut e| { e.computed = None; e })
                .collect();
            let delta = diff(&previous, &declared);

            let mut seen = HashSet::new();
            for entity in delta
                .added
                .iter()
                .chain(&delta.removed)
                .chain(&delta.modified)
                .chain(&delta.unchanged)
            {
                prop_assert!(seen.insert(entity.identity()), "{} appears twice", entity.identity());
            }

            let all: HashSet<EntityIdentity> = previous
                .iter()
                .chain(&declared)
                .map(|e| e.identity())
                .collect();
            prop_assert_eq!(seen, all);
        }

        #[test]
        fn prop_modified_carries_previous_computed(
            previous in proptest::collection::vec(arb_entity(), 0..8).prop_map(unique),
            declared in proptest::collection::vec(arb_entity(), 0..8).prop_map(unique),
        ) {
            let declared: Vec<EntityDescriptor> = declared
                .into_iter()
                .map(|mut e| { e.computed = None; e })
                .collect();
            let delta = diff(&previous, &declared);

            for modified in delta.modified.iter().chain(&delta.unchanged) {
                let prev = previous
                    .iter()
                    .find(|p| p.identity() == modified.identity())
                    .unwrap();
                prop_assert_eq!(&modified.computed, &prev.computed);
            }
            for added in &delta.added {
                prop_assert!(added.computed.is_none());
            }
        }
    }
}
