//! Reconciliation Actuate Module
//!
//! Executes the entity-level steps of a cycle against the inventory:
//!
//! - **attach**: resolve every pending entity, capture where it lives, then move
//!   all of them into the container in one call
//! - **detach**: move an entity back to its recorded resource pool, then to its
//!   recorded folder
//! - **push metadata**: send ordering records (and the description) in one
//!   reconfiguration
//! - **verify**: read back membership after a detach
//!
//! Every sub-step is written to the journal before the next one starts, and to
//! the cycle's [`Progress`] so a later failure is reported together with what
//! was already applied.

use inventory_client_interface::{EntityConfigRecord, InventoryError, ParentProperty, VAppConfigSpec};
use observability::entity_span;
use state_store_interface::{AttachmentPhase, DetachmentPhase};
use tracing::{debug, info, warn, Instrument};
use vapp_shared_types::{
    EntityDescriptor, EntityKind, EntityProvenance, FaultKind, MoKind, MoRef, Result, TaskFault,
    VAppError,
};

use super::plan::{plan_attachments, plan_detachments, JournalHandle};
use crate::lifecycle::ContainerHandle;
use crate::session::Session;

/// Remote steps a cycle has applied so far.
#[derive(Debug, Clone)]
pub struct Progress {
    operation: String,
    completed: Vec<String>,
}

impl Progress {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            completed: Vec::new(),
        }
    }

    pub fn complete(&mut self, step: impl Into<String>) {
        let step = step.into();
        debug!(operation = %self.operation, step = %step, "Step applied");
        self.completed.push(step);
    }

    pub fn completed(&self) -> &[String] {
        &self.completed
    }

    /// `err` as it should be reported: wrapped in a partial-application error once
    /// anything has been applied.
    pub fn fail(&self, err: VAppError) -> VAppError {
        if self.completed.is_empty() || matches!(err, VAppError::PartialApplication { .. }) {
            return err;
        }
        VAppError::partial(&self.operation, self.completed.join(", "), err)
    }
}

/// An inventory error attributed to `operation`.
pub(crate) fn remote_error(operation: &str, err: InventoryError) -> VAppError {
    match err {
        InventoryError::Fault(fault) => VAppError::RemoteTaskFault {
            operation: operation.to_string(),
            fault,
        },
        other => other.into(),
    }
}

fn parent_path(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => parent.to_string(),
        _ => "/".to_string(),
    }
}

fn names(entities: &[EntityDescriptor]) -> String {
    entities
        .iter()
        .map(|e| e.name.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// The ordering record pushed for an attached entity.
pub fn config_record(entity: &EntityDescriptor) -> Option<EntityConfigRecord> {
    let key = entity.reference()?;
    let ordering = &entity.ordering;
    Some(EntityConfigRecord {
        key,
        start_order: ordering.start_order,
        start_delay: ordering.start_delay,
        start_action: ordering.start_action,
        stop_delay: ordering.stop_delay,
        stop_action: ordering.stop_action,
        waiting_for_guest: ordering.waiting_for_guest,
        destroy_with_parent: ordering.destroy_with_parent,
    })
}

pub struct EntityReconciler<'a> {
    session: &'a Session,
}

impl<'a> EntityReconciler<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Move `entities` into the container. Returns them in input order with their
    /// provenance filled in, including ones an earlier attempt already moved.
    ///
    /// Every pending entity is resolved before anything moves, so an unknown
    /// entity leaves the inventory untouched.
    pub async fn attach(
        &self,
        container: &ContainerHandle,
        entities: &[EntityDescriptor],
        journal: &mut JournalHandle<'_>,
        progress: &mut Progress,
    ) -> Result<Vec<EntityDescriptor>> {
        let plan = plan_attachments(entities, journal.journal());
        if !plan.resumed.is_empty() {
            debug!(entities = %names(&plan.resumed), "Already moved by an earlier attempt");
        }

        let mut captured = Vec::with_capacity(plan.pending.len());
        for entity in &plan.pending {
            captured.push(self.capture(entity).await?);
        }

        if !captured.is_empty() {
            for entity in &captured {
                journal
                    .journal_mut()
                    .record_attachment(entity.clone(), AttachmentPhase::Pending);
            }
            journal.save().await?;

            let references: Vec<MoRef> = captured.iter().filter_map(|e| e.reference()).collect();
            self.session
                .client()
                .move_into_resource_pool(&container.reference, &references)
                .await
                .map_err(|e| remote_error("move into vApp", e))?;

            for entity in &captured {
                journal
                    .journal_mut()
                    .record_attachment(entity.clone(), AttachmentPhase::Moved);
            }
            journal.save().await?;
            progress.complete(format!("attached {}", names(&captured)));
            info!(
                vapp = %container.inventory_path,
                entities = %names(&captured),
                "Attached entities"
            );
        }

        Ok(entities
            .iter()
            .filter_map(|entity| {
                let identity = entity.identity();
                plan.resumed
                    .iter()
                    .chain(captured.iter())
                    .find(|e| e.identity() == identity)
                    .cloned()
            })
            .collect())
    }

    /// Resolve an entity and record its reference, folder and resource pool.
    async fn capture(&self, entity: &EntityDescriptor) -> Result<EntityDescriptor> {
        let found = self
            .session
            .find(entity.kind.mo_kind(), &entity.lookup_path())
            .await?;
        let property = match entity.kind {
            EntityKind::VirtualMachine => ParentProperty::ResourcePool,
            EntityKind::VirtualApp => ParentProperty::Parent,
        };
        let client = self.session.client();
        let pool = client.parent_of(&found.reference, property).await?;
        let resource_pool_path = client.element_path(&pool).await?;

        debug!(
            entity = %entity.identity(),
            reference = %found.reference,
            pool = %resource_pool_path,
            "Captured provenance"
        );
        Ok(entity.clone().with_computed(EntityProvenance {
            moid: found.reference.value.clone(),
            folder_path: parent_path(&found.inventory_path),
            resource_pool_path,
        }))
    }

    /// Move `entities` back to where they were before they were attached.
    pub async fn detach(
        &self,
        entities: &[EntityDescriptor],
        journal: &mut JournalHandle<'_>,
        progress: &mut Progress,
    ) -> Result<()> {
        for (entity, phase) in plan_detachments(entities, journal.journal()) {
            let span = entity_span!("detach", entity.identity());
            self.detach_one(&entity, phase, journal, progress)
                .instrument(span)
                .await?;
        }
        Ok(())
    }

    async fn detach_one(
        &self,
        entity: &EntityDescriptor,
        phase: DetachmentPhase,
        journal: &mut JournalHandle<'_>,
        progress: &mut Progress,
    ) -> Result<()> {
        let (reference, provenance) = match (entity.reference(), entity.computed.as_ref()) {
            (Some(reference), Some(provenance)) => (reference, provenance),
            _ => {
                return Err(VAppError::Internal(format!(
                    "{} has no recorded provenance",
                    entity.identity()
                )))
            }
        };
        let client = self.session.client();

        if phase < DetachmentPhase::PoolRestored {
            match client.element_path(&reference).await {
                Ok(_) => {}
                Err(InventoryError::NotFound { .. }) => {
                    warn!(entity = %entity.identity(), reference = %reference, "Entity no longer exists, nothing to detach");
                    journal
                        .journal_mut()
                        .record_detachment(entity.clone(), DetachmentPhase::FolderRestored);
                    return journal.save().await;
                }
                Err(err) => return Err(err.into()),
            }

            let pool = self
                .resolve_recorded(MoKind::ResourcePool, &provenance.resource_pool_path)
                .await?;
            client
                .move_into_resource_pool(&pool, std::slice::from_ref(&reference))
                .await
                .map_err(|e| remote_error("restore resource pool", e))?;
            journal
                .journal_mut()
                .record_detachment(entity.clone(), DetachmentPhase::PoolRestored);
            journal.save().await?;
            progress.complete(format!("restored resource pool of {}", entity.name));
        }

        let folder = self
            .resolve_recorded(MoKind::Folder, &provenance.folder_path)
            .await?;
        let task = client
            .move_into_folder(&folder, std::slice::from_ref(&reference))
            .await
            .map_err(|e| remote_error("restore folder", e))?;
        self.session.wait_for_success("restore folder", &task).await?;
        journal
            .journal_mut()
            .record_detachment(entity.clone(), DetachmentPhase::FolderRestored);
        journal.save().await?;
        progress.complete(format!("restored folder of {}", entity.name));

        info!(
            entity = %entity.identity(),
            pool = %provenance.resource_pool_path,
            folder = %provenance.folder_path,
            "Detached entity"
        );
        Ok(())
    }

    async fn resolve_recorded(&self, kind: MoKind, path: &str) -> Result<MoRef> {
        self.session
            .client()
            .find_by_inventory_path(path)
            .await?
            .map(|found| found.reference)
            .ok_or_else(|| VAppError::not_found(kind, path))
    }

    /// Send the ordering records of `entities` and the annotation in one
    /// reconfiguration. Returns `false` when there was nothing to send.
    pub async fn push_metadata(
        &self,
        container: &ContainerHandle,
        entities: &[EntityDescriptor],
        annotation: Option<&str>,
        progress: &mut Progress,
    ) -> Result<bool> {
        let records: Vec<EntityConfigRecord> = entities.iter().filter_map(config_record).collect();
        let spec = VAppConfigSpec {
            annotation: annotation.map(str::to_string),
            entity_config: (!records.is_empty()).then_some(records),
        };
        if spec.is_empty() {
            debug!(vapp = %container.inventory_path, "No metadata to push");
            return Ok(false);
        }

        let count = spec.entity_config.as_ref().map_or(0, Vec::len);
        self.session
            .client()
            .update_vapp_config(&container.reference, &spec)
            .await
            .map_err(|e| remote_error("reconfigure vApp", e))?;
        progress.complete("reconfigured vApp");
        info!(vapp = %container.inventory_path, entities = count, "Pushed entity metadata");
        Ok(true)
    }

    /// Check that none of `entities` is still listed as a member of the container.
    pub async fn verify_detached(
        &self,
        container: &ContainerHandle,
        entities: &[EntityDescriptor],
    ) -> Result<()> {
        let config = self.session.client().vapp_config(&container.reference).await?;
        for entity in entities {
            let Some(reference) = entity.reference() else {
                continue;
            };
            if config.entity_config.iter().any(|r| r.key == reference) {
                return Err(VAppError::RemoteTaskFault {
                    operation: "verify detach".to_string(),
                    fault: TaskFault::new(
                        FaultKind::InvalidState,
                        format!(
                            "{} is still a member of {}",
                            entity.identity(),
                            container.inventory_path
                        ),
                    ),
                });
            }
        }
        debug!(vapp = %container.inventory_path, "Detach verified");
        Ok(())
    }
}
