//! # Resource Error Types
//!
//! All errors that can occur in the resource subsystem.

use thiserror::Error;

use super::state::TransitionStep;

/// Errors that can occur while requesting or transitioning resources.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// A resource was requested as required but no provider is registered
    /// for its class.
    #[error("no provider registered for resource class {class} (recipe `{recipe}`)")]
    ProviderMissing {
        /// Name of the resource class that had no provider.
        class: &'static str,
        /// Recipe of the failed request.
        recipe: String,
    },

    /// A provider is already registered for this resource class.
    #[error("resource class provider collision ({class})")]
    ProviderCollision {
        /// Name of the already-claimed resource class.
        class: &'static str,
    },

    /// A provider failed to construct a resource.
    #[error("failed to create resource (recipe `{recipe}`): {reason}")]
    CreationFailed {
        /// Recipe of the failed request.
        recipe: String,
        /// Provider-supplied description of the failure.
        reason: String,
    },

    /// A concrete transition step reported failure.
    #[error("{step} failed: {reason}")]
    StepFailed {
        /// The step that failed.
        step: TransitionStep,
        /// Resource-supplied description of the failure.
        reason: String,
    },

    /// The resource is released; it can only be destroyed, not reused.
    #[error("resource is released and cannot serve further transitions")]
    Released,

    /// The resource is currently being transitioned. Reaching it again
    /// before that transition finished means its dependencies form a cycle.
    #[error("resource is already in transition (dependency cycle)")]
    InTransition,

    /// The handle does not name a live resource (its section was cleared,
    /// or the handle belongs to another manager).
    #[error("stale or unknown resource handle")]
    StaleHandle,
}

/// Result type for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
