//! # KARST Core Engine
//!
//! The kernel of the KARST engine: everything the host application and the
//! tooling build on, with no rendering, audio or I/O of its own.
//!
//! ## Subsystems
//!
//! 1. **Resources** - assets climb a readiness ladder (created, bound,
//!    preloaded, realized) under a manager that caches them per section and
//!    drives bulk transitions with either strict or best-effort semantics.
//! 2. **Messages** - a double-buffered, variable-length message queue moving
//!    tagged payloads from any number of producer threads to one consumer.
//! 3. **Entities** - numeric entity ids with runtime-reflected aspect data
//!    pools and creation broadcasts.
//!
//! ## Threading Rules
//!
//! Only the message queue is built for cross-thread use. The resource
//! manager and the entity world are confined to their owning thread; they
//! contain no internal locking.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod ecs;
pub mod msg;
pub mod resource;

pub use ecs::{AspectEvent, AspectType, BroadcastHandler, EntityId, EntityWorld};
pub use msg::{
    message_queue, Message, MessageReceiver, MessageSender, MessageWriter, ReleaseFn,
};
pub use resource::{
    drive_transition, GetResourceFlags, Resource, ResourceClass, ResourceError, ResourceId,
    ResourceManager, ResourceProvider, ResourceResult, ResourceState, SectionId, TransitionStep,
};
