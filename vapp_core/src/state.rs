//! Back-population of computed entity fields into the stored baseline.

use std::collections::HashMap;

use vapp_shared_types::{EntityDescriptor, EntityIdentity};

/// Overwrite the computed fields of every stored entity that was reconciled in
/// this cycle; stored entities that were not part of the cycle are kept as they
/// are. Order follows `stored`.
pub fn merge(stored: &[EntityDescriptor], reconciled: &[EntityDescriptor]) -> Vec<EntityDescriptor> {
    let by_identity: HashMap<EntityIdentity, &EntityDescriptor> =
        reconciled.iter().map(|e| (e.identity(), e)).collect();

    stored
        .iter()
        .map(|entity| match by_identity.get(&entity.identity()) {
            Some(done) => {
                let mut merged = entity.clone();
                merged.computed = done.computed.clone();
                merged
            }
            None => entity.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vapp_shared_types::{EntityKind, EntityOrdering, EntityProvenance};

    fn provenance(moid: &str) -> EntityProvenance {
        EntityProvenance {
            moid: moid.to_string(),
            folder_path: "/dc1/vm".to_string(),
            resource_pool_path: "/dc1/host/c1/Resources".to_string(),
        }
    }

    #[test]
    fn test_merge_overwrites_computed_by_identity() {
        let stored = vec![
            EntityDescriptor::new("a", EntityKind::VirtualMachine),
            EntityDescriptor::new("b", EntityKind::VirtualMachine)
                .with_computed(provenance("vm-old")),
            EntityDescriptor::new("c", EntityKind::VirtualApp),
        ];
        let reconciled = vec![
            EntityDescriptor::new("a", EntityKind::VirtualMachine).with_computed(provenance("vm-1")),
            EntityDescriptor::new("c", EntityKind::VirtualApp).with_computed(provenance("resgroup-3")),
        ];

        let merged = merge(&stored, &reconciled);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].computed.as_ref().unwrap().moid, "vm-1");
        assert_eq!(merged[1].computed.as_ref().unwrap().moid, "vm-old");
        assert_eq!(merged[2].computed.as_ref().unwrap().moid, "resgroup-3");
    }

    #[test]
    fn test_merge_keeps_stored_ordering() {
        let ordering = EntityOrdering {
            start_order: 4,
            ..Default::default()
        };
        let stored = vec![EntityDescriptor::new("a", EntityKind::VirtualMachine).with_ordering(ordering)];
        let reconciled =
            vec![EntityDescriptor::new("a", EntityKind::VirtualMachine).with_computed(provenance("vm-1"))];

        let merged = merge(&stored, &reconciled);
        assert_eq!(merged[0].ordering.start_order, 4);
        assert!(merged[0].is_attached());
    }

    #[test]
    fn test_merge_ignores_same_name_other_kind() {
        let stored = vec![EntityDescriptor::new("db", EntityKind::VirtualApp)];
        let reconciled =
            vec![EntityDescriptor::new("db", EntityKind::VirtualMachine).with_computed(provenance("vm-1"))];
        assert!(!merge(&stored, &reconciled)[0].is_attached());
    }
}
