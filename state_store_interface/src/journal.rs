//! Journal of an in-flight reconcile cycle.
//!
//! Attach (move into the container, then push ordering metadata) and detach
//! (restore the pool, then restore the folder) are multi-step sequences the
//! remote side does not run as one transaction. The journal records how far
//! each entity got, so a retried cycle resumes at the next step instead of
//! repeating moves that already happened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vapp_shared_types::{EntityDescriptor, EntityIdentity, MoRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalOperation {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentPhase {
    Pending,
    Moved,
    MetadataPushed,
    Committed,
}

impl AttachmentPhase {
    /// Whether the move into the container already happened.
    pub fn is_moved(&self) -> bool {
        *self >= AttachmentPhase::Moved
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetachmentPhase {
    Pending,
    PoolRestored,
    FolderRestored,
}

/// An entity being attached. `entity.computed` is filled in once the
/// provenance has been captured, which happens before the move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub entity: EntityDescriptor,
    pub phase: AttachmentPhase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetachmentRecord {
    pub entity: EntityDescriptor,
    pub phase: DetachmentPhase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationJournal {
    pub container_id: String,
    pub operation: JournalOperation,
    /// Set once the container exists remotely, whether created by this cycle or found.
    #[serde(default)]
    pub container: Option<MoRef>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRecord>,
    #[serde(default)]
    pub detachments: Vec<DetachmentRecord>,
    pub started_at: DateTime<Utc>,
}

impl OperationJournal {
    pub fn new(container_id: impl Into<String>, operation: JournalOperation) -> Self {
        Self {
            container_id: container_id.into(),
            operation,
            container: None,
            attachments: Vec::new(),
            detachments: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn attachment(&self, identity: &EntityIdentity) -> Option<&AttachmentRecord> {
        self.attachments
            .iter()
            .find(|r| &r.entity.identity() == identity)
    }

    pub fn detachment(&self, identity: &EntityIdentity) -> Option<&DetachmentRecord> {
        self.detachments
            .iter()
            .find(|r| &r.entity.identity() == identity)
    }

    /// Record or replace an attachment.
    pub fn record_attachment(&mut self, entity: EntityDescriptor, phase: AttachmentPhase) {
        let identity = entity.identity();
        match self
            .attachments
            .iter_mut()
            .find(|r| r.entity.identity() == identity)
        {
            Some(record) => {
                record.entity = entity;
                record.phase = phase;
            }
            None => self.attachments.push(AttachmentRecord { entity, phase }),
        }
    }

    pub fn record_detachment(&mut self, entity: EntityDescriptor, phase: DetachmentPhase) {
        let identity = entity.identity();
        match self
            .detachments
            .iter_mut()
            .find(|r| r.entity.identity() == identity)
        {
            Some(record) => {
                record.entity = entity;
                record.phase = phase;
            }
            None => self.detachments.push(DetachmentRecord { entity, phase }),
        }
    }

    /// Advance every attachment at or past `from` to `to`.
    pub fn advance_attachments(&mut self, from: AttachmentPhase, to: AttachmentPhase) {
        for record in self.attachments.iter_mut() {
            if record.phase >= from && record.phase < to {
                record.phase = to;
            }
        }
    }
}
