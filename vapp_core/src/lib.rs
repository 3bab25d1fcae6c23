//! vApp container lifecycle and reconciliation engine.
//!
//! [`VAppReconciler`] runs one create, read, update or delete cycle per call
//! against an [`InventoryClient`], persisting the applied baseline and the
//! journal of in-flight sub-steps in a [`StateStore`].
//!
//! Lifecycle: create → attach entities → power on; power off → detach entities →
//! destroy. A failed cycle is retried as a whole; the journal lets the retry skip
//! the sub-steps that already happened.

pub mod lifecycle;
pub mod location;
pub mod power;
pub mod reconciliation;
pub mod session;
pub mod state;
pub mod task;

use std::sync::Arc;

use chrono::Utc;
use inventory_client_interface::InventoryClient;
use observability::vapp_span;
use reconciler_config::ReconcilerConfig;
use state_store_interface::{AttachmentPhase, DetachmentPhase, JournalOperation, StateStore, StoredVApp};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;
use vapp_shared_types::{DeclaredContainer, EntityDescriptor, MetadataScope, MoKind, MoRef, Result, VAppError};

pub use lifecycle::{ContainerHandle, LifecycleManager};
pub use location::{LocationResolver, ResolvedLocation};
pub use power::{PowerController, PowerTransition};
pub use reconciliation::{diff, EntityReconciler, JournalHandle, Progress, ReconciliationDelta};
pub use session::Session;
pub use state::merge;
pub use task::{BackoffStrategy, TaskOutcome, TaskWaiter, WaitPolicy};

use reconciliation::{metadata_targets, observe, stranded_attachments, ContainerObservation};

/// Behaviour switches for reconcile cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub metadata_scope: MetadataScope,
    pub wait_policy: WaitPolicy,
    /// Read the container back after detaching and fail if a removed entity is still listed.
    pub verify_detach: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self::from_config(&ReconcilerConfig::default())
    }
}

impl ReconcileOptions {
    pub fn from_config(config: &ReconcilerConfig) -> Self {
        Self {
            metadata_scope: config.metadata_scope,
            wait_policy: WaitPolicy::from_settings(&config.task_wait),
            verify_detach: config.verify_detach,
        }
    }

    pub fn with_metadata_scope(mut self, scope: MetadataScope) -> Self {
        self.metadata_scope = scope;
        self
    }

    pub fn with_wait_policy(mut self, policy: WaitPolicy) -> Self {
        self.wait_policy = policy;
        self
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn record_power(progress: &mut Progress, transition: PowerTransition, step: &str) {
    if transition == PowerTransition::Changed {
        progress.complete(step);
    }
}

pub struct VAppReconciler {
    client: Arc<dyn InventoryClient>,
    store: Arc<dyn StateStore>,
    options: ReconcileOptions,
}

impl VAppReconciler {
    pub fn new(
        client: Arc<dyn InventoryClient>,
        store: Arc<dyn StateStore>,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            client,
            store,
            options,
        }
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    async fn open_session(&self, datacenter: Option<&str>) -> Result<Session> {
        Session::open(
            self.client.clone(),
            datacenter,
            self.options.wait_policy.clone(),
        )
        .await
    }

    // ===== Create =====

    /// Create the container, attach the declared entities, push their ordering
    /// and the description, then power on if the container is not empty.
    pub async fn create(&self, declared: &DeclaredContainer) -> Result<StoredVApp> {
        let id = declared.inventory_path();
        let span = vapp_span!("create", id, Uuid::new_v4());
        self.run_create(declared, &id).instrument(span).await
    }

    async fn run_create(&self, declared: &DeclaredContainer, id: &str) -> Result<StoredVApp> {
        declared.validate_entities()?;
        if self.store.get_vapp(id).await?.is_some() {
            return Err(VAppError::configuration(format!(
                "vApp {} is already managed; update it instead",
                id
            )));
        }

        let session = self
            .open_session(declared.placement.datacenter.as_deref())
            .await?;
        let mut journal =
            JournalHandle::load_or_start(self.store.as_ref(), id, JournalOperation::Create).await?;
        let mut progress = Progress::new("create vApp");

        self.create_steps(&session, declared, id, &mut journal, &mut progress)
            .await
            .map_err(|e| progress.fail(e))
    }

    async fn create_steps(
        &self,
        session: &Session,
        declared: &DeclaredContainer,
        id: &str,
        journal: &mut JournalHandle<'_>,
        progress: &mut Progress,
    ) -> Result<StoredVApp> {
        let lifecycle = LifecycleManager::new(session);
        let existing = match journal.journal().container.clone() {
            Some(reference) => lifecycle.handle_for(&reference).await?,
            None => None,
        };

        let container = match existing {
            Some(handle) => {
                info!(vapp = %handle.inventory_path, "Resuming against the container of an earlier attempt");
                handle
            }
            None => {
                let location = LocationResolver::new(session).resolve(declared).await?;
                let handle = lifecycle.create(declared, &location).await?;
                journal.journal_mut().container = Some(handle.reference.clone());
                journal.save().await?;
                progress.complete(format!("created {}", handle.inventory_path));
                handle
            }
        };

        let entities = EntityReconciler::new(session);
        let attached = entities
            .attach(&container, &declared.entities, journal, progress)
            .await?;
        entities
            .push_metadata(&container, &attached, Some(declared.description.as_str()), progress)
            .await?;
        journal
            .journal_mut()
            .advance_attachments(AttachmentPhase::Moved, AttachmentPhase::MetadataPushed);
        journal.save().await?;

        let transition = PowerController::new(session).power_on(&container).await?;
        record_power(progress, transition, "powered on");

        let config = session.client().vapp_config(&container.reference).await?;
        let stored = StoredVApp {
            id: id.to_string(),
            name: declared.name.clone(),
            description: declared.description.clone(),
            datacenter: declared.placement.datacenter.clone(),
            reference: Some(container.reference.clone()),
            instance_uuid: non_empty(config.instance_uuid),
            entities: state::merge(&declared.entities, &attached),
            updated_at: Utc::now(),
        };
        self.store.commit(stored.clone()).await?;

        info!(
            vapp = %container.inventory_path,
            entities = stored.entities.len(),
            "vApp created"
        );
        Ok(stored)
    }

    // ===== Read =====

    /// Refresh the stored baseline from the inventory. `None` when nothing is
    /// stored, or when the container no longer exists (its baseline is dropped).
    pub async fn read(&self, id: &str) -> Result<Option<StoredVApp>> {
        let span = vapp_span!("read", id, Uuid::new_v4());
        self.run_read(id).instrument(span).await
    }

    async fn run_read(&self, id: &str) -> Result<Option<StoredVApp>> {
        let Some(mut stored) = self.store.get_vapp(id).await? else {
            debug!(vapp = id, "Nothing stored");
            return Ok(None);
        };

        let session = self.open_session(stored.datacenter.as_deref()).await?;
        let Some(observed) = observe(&session, id, stored.reference.as_ref()).await? else {
            warn!(vapp = id, "vApp no longer exists, dropping stored state");
            self.forget(id).await?;
            return Ok(None);
        };

        stored.reference = Some(observed.handle.reference.clone());
        stored.instance_uuid = non_empty(observed.config.instance_uuid).or(stored.instance_uuid);
        stored.updated_at = Utc::now();
        self.store.put_vapp(stored.clone()).await?;
        Ok(Some(stored))
    }

    // ===== Update =====

    /// Converge the container's entities on `declared`: attach added ones, detach
    /// removed ones (including any an interrupted cycle left inside), push
    /// ordering for the configured metadata scope.
    pub async fn update(&self, id: &str, declared: &DeclaredContainer) -> Result<StoredVApp> {
        let span = vapp_span!("update", id, Uuid::new_v4());
        self.run_update(id, declared).instrument(span).await
    }

    async fn run_update(&self, id: &str, declared: &DeclaredContainer) -> Result<StoredVApp> {
        declared.validate_entities()?;
        let baseline = self
            .store
            .get_vapp(id)
            .await?
            .ok_or_else(|| VAppError::State(format!("no stored state for vApp {}", id)))?;

        let datacenter = declared
            .placement
            .datacenter
            .clone()
            .or_else(|| baseline.datacenter.clone());
        let session = self.open_session(datacenter.as_deref()).await?;
        let observed = observe(&session, id, baseline.reference.as_ref())
            .await?
            .ok_or_else(|| VAppError::not_found(MoKind::VirtualApp, id))?;

        // Entities an interrupted cycle moved in but never committed.
        let carried = match self.store.get_journal(id).await? {
            Some(previous) if previous.operation != JournalOperation::Delete => {
                stranded_attachments(&previous)
            }
            _ => Vec::new(),
        };
        let mut journal =
            JournalHandle::load_or_start(self.store.as_ref(), id, JournalOperation::Update).await?;
        for entity in &carried {
            if journal.journal().attachment(&entity.identity()).is_none() {
                journal
                    .journal_mut()
                    .record_attachment(entity.clone(), AttachmentPhase::Moved);
            }
        }

        let mut delta = diff(&baseline.entities, &declared.entities);
        for entity in carried {
            let identity = entity.identity();
            let still_declared = declared.entities.iter().any(|e| e.identity() == identity);
            if !still_declared && !delta.removed.iter().any(|e| e.identity() == identity) {
                warn!(entity = %identity, "Left inside the vApp by an interrupted cycle, detaching");
                delta.removed.push(entity);
            }
        }
        let description_changed = declared.description != baseline.description;
        debug!(
            added = delta.added.len(),
            removed = delta.removed.len(),
            modified = delta.modified.len(),
            description_changed,
            "Computed reconciliation delta"
        );

        let mut progress = Progress::new("update vApp");
        let reconciled = self
            .update_steps(
                &session,
                &observed,
                declared,
                &delta,
                description_changed,
                &mut journal,
                &mut progress,
            )
            .await
            .map_err(|e| progress.fail(e))?;

        let stored = StoredVApp {
            id: id.to_string(),
            name: declared.name.clone(),
            description: declared.description.clone(),
            datacenter,
            reference: Some(observed.handle.reference.clone()),
            instance_uuid: non_empty(observed.config.instance_uuid.clone()).or(baseline.instance_uuid),
            entities: state::merge(&declared.entities, &reconciled),
            updated_at: Utc::now(),
        };
        self.store.commit(stored.clone()).await?;

        info!(
            vapp = %observed.handle.inventory_path,
            steps = progress.completed().len(),
            "vApp updated"
        );
        Ok(stored)
    }

    /// Returns every declared entity that ended the cycle attached.
    #[allow(clippy::too_many_arguments)]
    async fn update_steps(
        &self,
        session: &Session,
        observed: &ContainerObservation,
        declared: &DeclaredContainer,
        delta: &ReconciliationDelta,
        description_changed: bool,
        journal: &mut JournalHandle<'_>,
        progress: &mut Progress,
    ) -> Result<Vec<EntityDescriptor>> {
        let container = &observed.handle;
        let entities = EntityReconciler::new(session);
        let power = PowerController::new(session);

        // Declared entities with no provenance have never been attached.
        let mut to_attach = delta.added.clone();
        to_attach.extend(
            delta
                .modified
                .iter()
                .chain(&delta.unchanged)
                .filter(|e| !e.is_attached())
                .cloned(),
        );

        // Additions are resolved and moved before anything leaves, so an unknown
        // entity aborts the cycle with the container untouched.
        let attached = entities
            .attach(container, &to_attach, journal, progress)
            .await?;

        if !delta.removed.is_empty() {
            let leaving: Vec<MoRef> = delta.removed.iter().filter_map(|e| e.reference()).collect();
            let mut remaining: Vec<MoRef> = Vec::new();
            for member in observed
                .members()
                .into_iter()
                .chain(attached.iter().filter_map(|e| e.reference()))
            {
                if !leaving.contains(&member) && !remaining.contains(&member) {
                    remaining.push(member);
                }
            }
            if remaining.is_empty() {
                info!(vapp = %container.inventory_path, "Last entities leaving, powering off");
                let transition = power.power_off(container).await?;
                record_power(progress, transition, "powered off");
            }

            entities.detach(&delta.removed, journal, progress).await?;
            if self.options.verify_detach {
                entities
                    .verify_detached(container, &delta.removed)
                    .await
                    .map_err(|e| {
                        let detached: Vec<&str> =
                            delta.removed.iter().map(|e| e.name.as_str()).collect();
                        VAppError::partial(
                            "update vApp",
                            format!("detached {}", detached.join(" ")),
                            e,
                        )
                    })?;
            }
        }

        let targets = metadata_targets(
            self.options.metadata_scope,
            &attached,
            &delta.modified,
            &delta.unchanged,
        );
        let annotation = description_changed.then_some(declared.description.as_str());
        entities
            .push_metadata(container, &targets, annotation, progress)
            .await?;
        journal
            .journal_mut()
            .advance_attachments(AttachmentPhase::Moved, AttachmentPhase::MetadataPushed);
        journal.save().await?;

        if observed.is_empty() && !attached.is_empty() {
            let transition = power.power_on(container).await?;
            record_power(progress, transition, "powered on");
        }

        let mut reconciled = attached;
        reconciled.extend(
            delta
                .modified
                .iter()
                .chain(&delta.unchanged)
                .filter(|e| e.is_attached())
                .cloned(),
        );
        Ok(reconciled)
    }

    // ===== Delete =====

    /// Power off, move every entity back to where it came from, destroy the
    /// container. A container that no longer exists counts as deleted.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let span = vapp_span!("delete", id, Uuid::new_v4());
        self.run_delete(id).instrument(span).await
    }

    async fn run_delete(&self, id: &str) -> Result<()> {
        let Some(baseline) = self.store.get_vapp(id).await? else {
            debug!(vapp = id, "Nothing stored, nothing to delete");
            return self.store.clear_journal(id).await;
        };

        let session = self.open_session(baseline.datacenter.as_deref()).await?;
        let Some(observed) = observe(&session, id, baseline.reference.as_ref()).await? else {
            warn!(vapp = id, "vApp already gone");
            return self.forget(id).await;
        };

        // Entities an interrupted create or update moved in but never committed.
        let stranded = match self.store.get_journal(id).await? {
            Some(previous) if previous.operation != JournalOperation::Delete => {
                stranded_attachments(&previous)
            }
            _ => Vec::new(),
        };

        let mut journal =
            JournalHandle::load_or_start(self.store.as_ref(), id, JournalOperation::Delete).await?;
        if !stranded.is_empty() {
            for entity in stranded {
                if journal.journal().detachment(&entity.identity()).is_none() {
                    journal
                        .journal_mut()
                        .record_detachment(entity, DetachmentPhase::Pending);
                }
            }
            journal.save().await?;
        }

        let mut leaving: Vec<EntityDescriptor> = baseline
            .entities
            .iter()
            .filter(|e| e.is_attached())
            .cloned()
            .collect();
        for record in &journal.journal().detachments {
            if !leaving.iter().any(|e| e.identity() == record.entity.identity()) {
                leaving.push(record.entity.clone());
            }
        }

        let mut progress = Progress::new("delete vApp");
        self.delete_steps(&session, &observed.handle, &leaving, &mut journal, &mut progress)
            .await
            .map_err(|e| progress.fail(e))?;

        self.forget(id).await?;
        info!(vapp = %observed.handle.inventory_path, "vApp deleted");
        Ok(())
    }

    async fn delete_steps(
        &self,
        session: &Session,
        container: &ContainerHandle,
        leaving: &[EntityDescriptor],
        journal: &mut JournalHandle<'_>,
        progress: &mut Progress,
    ) -> Result<()> {
        let transition = PowerController::new(session).power_off(container).await?;
        record_power(progress, transition, "powered off");

        EntityReconciler::new(session)
            .detach(leaving, journal, progress)
            .await?;

        LifecycleManager::new(session).destroy(container).await?;
        progress.complete("destroyed");
        Ok(())
    }

    async fn forget(&self, id: &str) -> Result<()> {
        self.store.delete_vapp(id).await?;
        self.store.clear_journal(id).await
    }
}
