//! Entity reconciliation for one container.
//!
//! Each update cycle runs the same four phases:
//! 1. **Sense**: read the container back from the inventory
//! 2. **Compare**: diff the declared entities against the stored baseline
//! 3. **Plan**: drop sub-steps an interrupted attempt already applied
//! 4. **Actuate**: detach, attach, push metadata
//!
//! ```text
//! ┌─────────┐      ┌─────────┐      ┌──────┐      ┌─────────┐
//! │ Sense   │─────▶│ Compare │─────▶│ Plan │─────▶│ Actuate │
//! └─────────┘      └─────────┘      └──────┘      └─────────┘
//!                                       ▲               │
//!                                       │    journal    │
//!                                       └───────────────┘
//! ```
//!
//! The remote side runs each call atomically but not the sequence, so every
//! sub-step is journaled and a retried cycle picks up where the last one stopped.

pub mod actuate;
pub mod compare;
pub mod plan;
pub mod sense;

pub use actuate::{config_record, EntityReconciler, Progress};
pub use compare::{diff, ReconciliationDelta};
pub use plan::{
    metadata_targets, plan_attachments, plan_detachments, stranded_attachments, AttachmentPlan,
    JournalHandle,
};
pub use sense::{observe, ContainerObservation};
