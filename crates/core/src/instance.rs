// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow instance identity and lifecycle state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

crate::define_id! {
    /// Logical identifier of a workflow instance.
    ///
    /// Callers may choose their own instance IDs (sub-workflow targets are
    /// addressed by these strings), so values shorter than the generated
    /// form are accepted.
    pub struct InstanceId("wfi-");
}

crate::define_id! {
    /// Identifier of one execution of an instance.
    pub struct ExecutionId("exe-");
}

crate::define_id! {
    /// Identifier a worker publishes for sticky task routing.
    pub struct WorkerId("wkr-");
}

/// User-supplied key/value metadata carried on an instance.
pub type Metadata = HashMap<String, String>;

/// Parent linkage for sub-workflow instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentLink {
    pub instance_id: InstanceId,
    /// Schedule event id of the parent command that created this child,
    /// used to route the child's completion back to the right future.
    pub schedule_event_id: u64,
}

/// A durable execution of a workflow function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub instance_id: InstanceId,
    pub execution_id: ExecutionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentLink>,
}

impl WorkflowInstance {
    /// A top-level instance with a fresh execution id.
    pub fn new(instance_id: InstanceId) -> Self {
        Self { instance_id, execution_id: ExecutionId::new(), parent: None }
    }

    pub fn with_execution(instance_id: InstanceId, execution_id: ExecutionId) -> Self {
        Self { instance_id, execution_id, parent: None }
    }

    /// A child instance created by a parent's schedule command.
    pub fn sub_workflow(
        instance_id: InstanceId,
        parent_instance_id: InstanceId,
        parent_schedule_event_id: u64,
    ) -> Self {
        Self {
            instance_id,
            execution_id: ExecutionId::new(),
            parent: Some(ParentLink {
                instance_id: parent_instance_id,
                schedule_event_id: parent_schedule_event_id,
            }),
        }
    }

    pub fn is_sub_workflow(&self) -> bool {
        self.parent.is_some()
    }
}

/// Lifecycle state of an instance. Instances are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    #[default]
    Active,
    Finished,
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
