//! Power sequencing for a container.
//!
//! Power-on is only issued when the container has at least one entity, since the
//! remote side rejects powering on an empty container. Power-off is never
//! forced, so each entity's stop action applies. Both directions treat
//! "already in the requested power state" as success.

use tracing::{debug, info};
use vapp_shared_types::{Result, VAppError};

use crate::lifecycle::ContainerHandle;
use crate::session::Session;
use crate::task::TaskOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerTransition {
    /// The power state changed.
    Changed,
    /// The container already was in the requested state.
    AlreadyInState,
    /// Power-on skipped because the container has no entities.
    SkippedEmpty,
}

pub struct PowerController<'a> {
    session: &'a Session,
}

impl<'a> PowerController<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    pub async fn power_on(&self, container: &ContainerHandle) -> Result<PowerTransition> {
        let config = self
            .session
            .client()
            .vapp_config(&container.reference)
            .await?;
        if config.entity_config.is_empty() {
            debug!(vapp = %container.inventory_path, "No entities, not powering on");
            return Ok(PowerTransition::SkippedEmpty);
        }

        let task = self
            .session
            .client()
            .power_on_vapp(&container.reference)
            .await?;
        let transition = self.settle("power on vApp", self.session.wait(&task).await?)?;
        info!(vapp = %container.inventory_path, ?transition, "Powered on");
        Ok(transition)
    }

    pub async fn power_off(&self, container: &ContainerHandle) -> Result<PowerTransition> {
        let task = self
            .session
            .client()
            .power_off_vapp(&container.reference, false)
            .await?;
        let transition = self.settle("power off vApp", self.session.wait(&task).await?)?;
        info!(vapp = %container.inventory_path, ?transition, "Powered off");
        Ok(transition)
    }

    fn settle(&self, operation: &str, outcome: TaskOutcome) -> Result<PowerTransition> {
        match outcome {
            TaskOutcome::Success(_) => Ok(PowerTransition::Changed),
            TaskOutcome::Fault(fault) if fault.is_invalid_power_state() => {
                Ok(PowerTransition::AlreadyInState)
            }
            TaskOutcome::Fault(fault) => Err(VAppError::RemoteTaskFault {
                operation: operation.to_string(),
                fault,
            }),
            TaskOutcome::TimedOut => Err(VAppError::Communication(format!(
                "{} did not finish before the deadline",
                operation
            ))),
        }
    }
}
