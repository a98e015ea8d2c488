// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error value recorded in history and observed through workflow futures.

use crate::payload::PayloadError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An error observable by workflow code.
///
/// These cross turn boundaries inside events, so they are plain data:
/// cloneable, comparable, serializable. Everything that is not a
/// cancellation or a missing signal target collapses to a message string,
/// which is what gets recorded in history.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowError {
    /// The operation was canceled via its context.
    #[error("canceled")]
    Canceled,
    /// A signal or cancellation targeted an instance the backend does not know.
    #[error("workflow instance not found: {instance_id}")]
    InstanceNotFound { instance_id: String },
    /// An activity, sub-workflow, or workflow function failed.
    #[error("{message}")]
    Failure { message: String },
}

impl WorkflowError {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure { message: message.into() }
    }

    pub fn instance_not_found(instance_id: impl Into<String>) -> Self {
        Self::InstanceNotFound { instance_id: instance_id.into() }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

impl From<PayloadError> for WorkflowError {
    fn from(e: PayloadError) -> Self {
        Self::failure(e.to_string())
    }
}
