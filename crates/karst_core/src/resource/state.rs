//! # Readiness State Machine
//!
//! A resource's readiness forms a total order: `Created < Bound < Preloaded
//! < Realized`. `Released` sits outside the order as a terminal sink.
//!
//! The driver in this module only sequences transitions and records the
//! reached level; the concrete work lives in the five steps a resource
//! implements. Moving up passes through every intermediate level, moving
//! down undoes levels in strictly descending order, and a failing step
//! leaves the resource at the last level it actually reached.

use std::any::Any;
use std::fmt;

use super::error::ResourceError;
use super::manager::ResourceManager;

/// Readiness level of a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Constructed, nothing acquired yet.
    Created,
    /// Referenced sub-resources are resolved.
    Bound,
    /// Bulk data is loaded (safe off the owning thread of live objects).
    Preloaded,
    /// Live objects (GPU buffers, device handles) exist.
    Realized,
    /// Unloaded and unrealized for good; the instance awaits destruction.
    Released,
}

/// One concrete step of the readiness ladder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionStep {
    /// `Created -> Bound`.
    BindDependencies,
    /// `Bound -> Preloaded`.
    Preload,
    /// `Preloaded -> Realized`.
    Realize,
    /// `Preloaded -> Bound` (and part of releasing).
    Unload,
    /// `Realized -> Preloaded` (and part of releasing).
    Unrealize,
}

impl fmt::Display for TransitionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BindDependencies => "bind_dependencies",
            Self::Preload => "preload",
            Self::Realize => "realize",
            Self::Unload => "unload",
            Self::Unrealize => "unrealize",
        })
    }
}

/// A loadable asset driven through the readiness ladder.
///
/// # Implementing a resource
///
/// 1. Store a [`ResourceState`] field, initialized to
///    [`ResourceState::Created`], and expose it through
///    [`state`](Resource::state)/[`set_state`](Resource::set_state).
/// 2. Implement the five steps. The fallible ones receive the manager so a
///    resource can fetch the sub-resources it depends on.
/// 3. Forward [`as_any`](Resource::as_any)/[`as_any_mut`](Resource::as_any_mut)
///    to `self` so typed lookups can downcast.
///
/// `unload` and `unrealize` must tolerate redundant calls: releasing runs
/// both regardless of the current level.
pub trait Resource: Any {
    /// Current readiness level.
    fn state(&self) -> ResourceState;

    /// Overwrites the readiness level. Called by [`drive_transition`] after
    /// each successful step; not meant for anyone else.
    fn set_state(&mut self, state: ResourceState);

    /// Resolves referenced sub-resources. `Created -> Bound`.
    fn bind_dependencies(&mut self, manager: &mut ResourceManager) -> Result<(), ResourceError>;

    /// Loads bulk data. `Bound -> Preloaded`.
    fn preload(&mut self, manager: &mut ResourceManager) -> Result<(), ResourceError>;

    /// Creates live objects. `Preloaded -> Realized`.
    fn realize(&mut self, manager: &mut ResourceManager) -> Result<(), ResourceError>;

    /// Drops bulk data. Must tolerate being called when nothing is loaded.
    fn unload(&mut self);

    /// Drops live objects. Must tolerate being called when nothing is
    /// realized.
    fn unrealize(&mut self);

    /// Upcast used for typed downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast used for typed downcasting.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Drives `res` from its current readiness level to `target`.
///
/// Already being at `target` is a successful no-op. A failing step aborts
/// the transition; the resource keeps the last level it reached. Driving
/// toward [`ResourceState::Released`] cannot fail: both `unload` and
/// `unrealize` run (idempotently) and the resource is marked released.
///
/// A released resource accepts no target other than `Released` and reports
/// [`ResourceError::Released`]; destroy it instead.
///
/// # Errors
///
/// Forwards the first [`ResourceError`] a step reports.
pub fn drive_transition(
    res: &mut dyn Resource,
    target: ResourceState,
    manager: &mut ResourceManager,
) -> Result<(), ResourceError> {
    if res.state() == target {
        return Ok(());
    }

    if res.state() == ResourceState::Released {
        return Err(ResourceError::Released);
    }

    match target {
        // The ladder bottoms out at Bound; there is no unbind step, so
        // Created is only ever left, never returned to.
        ResourceState::Created => {}

        ResourceState::Bound => {
            if res.state() == ResourceState::Realized {
                res.unrealize();
                res.set_state(ResourceState::Preloaded);
            }
            if res.state() == ResourceState::Preloaded {
                res.unload();
                res.set_state(ResourceState::Bound);
            }
            if res.state() == ResourceState::Created {
                res.bind_dependencies(manager)?;
                res.set_state(ResourceState::Bound);
            }
        }

        ResourceState::Preloaded => {
            if res.state() == ResourceState::Realized {
                res.unrealize();
                res.set_state(ResourceState::Preloaded);
            }
            if res.state() == ResourceState::Created {
                res.bind_dependencies(manager)?;
                res.set_state(ResourceState::Bound);
            }
            if res.state() == ResourceState::Bound {
                res.preload(manager)?;
                res.set_state(ResourceState::Preloaded);
            }
        }

        ResourceState::Realized => {
            if res.state() == ResourceState::Created {
                res.bind_dependencies(manager)?;
                res.set_state(ResourceState::Bound);
            }
            if res.state() == ResourceState::Bound {
                res.preload(manager)?;
                res.set_state(ResourceState::Preloaded);
            }
            if res.state() == ResourceState::Preloaded {
                res.realize(manager)?;
                res.set_state(ResourceState::Realized);
            }
        }

        ResourceState::Released => {
            res.unload();
            res.unrealize();
            res.set_state(ResourceState::Released);
        }
    }

    Ok(())
}
