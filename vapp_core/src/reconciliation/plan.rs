//! Reconciliation planning.
//!
//! Decides which sub-steps of attach and detach still have to run, given the
//! journal a previous, interrupted cycle left behind, and which entities the
//! post-attach reconfiguration carries.
//!
//! Attach is `Pending -> Moved -> MetadataPushed -> Committed`; detach is
//! `Pending -> PoolRestored -> FolderRestored`. An entity already `Moved` keeps
//! the provenance captured on the first attempt: capturing again would record
//! the container itself as the entity's prior pool.

use state_store_interface::{
    AttachmentPhase, DetachmentPhase, JournalOperation, OperationJournal, StateStore,
};
use tracing::{debug, info};
use vapp_shared_types::{EntityDescriptor, MetadataScope, Result};

/// The journal of the running cycle, persisted after every sub-step.
pub struct JournalHandle<'a> {
    store: &'a dyn StateStore,
    journal: OperationJournal,
}

impl<'a> JournalHandle<'a> {
    /// Resume the journal for `id` if it belongs to the same operation, else start a new one.
    pub async fn load_or_start(
        store: &'a dyn StateStore,
        id: &str,
        operation: JournalOperation,
    ) -> Result<Self> {
        let journal = match store.get_journal(id).await? {
            Some(existing) if existing.operation == operation => {
                info!(
                    vapp = id,
                    started_at = %existing.started_at,
                    "Resuming interrupted operation"
                );
                existing
            }
            Some(existing) => {
                debug!(vapp = id, previous = ?existing.operation, "Discarding journal of another operation");
                OperationJournal::new(id, operation)
            }
            None => OperationJournal::new(id, operation),
        };
        Ok(Self { store, journal })
    }

    pub fn journal(&self) -> &OperationJournal {
        &self.journal
    }

    pub fn journal_mut(&mut self) -> &mut OperationJournal {
        &mut self.journal
    }

    pub async fn save(&self) -> Result<()> {
        self.store.put_journal(self.journal.clone()).await
    }
}

/// Attach work left for a set of entities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentPlan {
    /// Not moved yet: resolve, capture provenance, move.
    pub pending: Vec<EntityDescriptor>,
    /// Moved by an earlier attempt; declared attributes with the journal's provenance.
    pub resumed: Vec<EntityDescriptor>,
}

pub fn plan_attachments(entities: &[EntityDescriptor], journal: &OperationJournal) -> AttachmentPlan {
    let mut plan = AttachmentPlan::default();
    for entity in entities {
        match journal.attachment(&entity.identity()) {
            Some(record) if record.phase.is_moved() => {
                let mut resumed = entity.clone();
                resumed.computed = record.entity.computed.clone();
                plan.resumed.push(resumed);
            }
            _ => plan.pending.push(entity.clone()),
        }
    }
    plan
}

/// Detach steps left per entity, with the phase each one is at. Entities that
/// were already fully restored are left out.
pub fn plan_detachments(
    entities: &[EntityDescriptor],
    journal: &OperationJournal,
) -> Vec<(EntityDescriptor, DetachmentPhase)> {
    entities
        .iter()
        .filter_map(|entity| {
            let phase = journal
                .detachment(&entity.identity())
                .map(|r| r.phase)
                .unwrap_or(DetachmentPhase::Pending);
            (phase < DetachmentPhase::FolderRestored).then(|| (entity.clone(), phase))
        })
        .collect()
}

/// Entities that were moved into the container by an earlier attempt of any
/// operation and are still inside it. The next update or delete has to account
/// for these.
pub fn stranded_attachments(journal: &OperationJournal) -> Vec<EntityDescriptor> {
    journal
        .attachments
        .iter()
        .filter(|r| r.phase.is_moved() && r.phase < AttachmentPhase::Committed)
        .filter(|r| {
            journal
                .detachment(&r.entity.identity())
                .map_or(true, |d| d.phase < DetachmentPhase::FolderRestored)
        })
        .map(|r| r.entity.clone())
        .collect()
}

/// Entities whose ordering goes into the post-attach reconfiguration.
///
/// The remote call replaces the whole ordering list. `ChangedOnly` sends the
/// attached and modified entities; `AllDeclared` also sends every unchanged
/// entity that is attached, so its ordering survives the replacement.
pub fn metadata_targets(
    scope: MetadataScope,
    attached: &[EntityDescriptor],
    modified: &[EntityDescriptor],
    unchanged: &[EntityDescriptor],
) -> Vec<EntityDescriptor> {
    let mut targets: Vec<EntityDescriptor> = attached
        .iter()
        .chain(modified.iter().filter(|e| e.is_attached()))
        .cloned()
        .collect();
    if scope == MetadataScope::AllDeclared {
        targets.extend(unchanged.iter().filter(|e| e.is_attached()).cloned());
    }
    targets
}
