//! # Entity/Aspect World
//!
//! Entities are bare numeric ids; everything interesting about them lives
//! in *aspects*: plain data structs attached per entity. Aspect types are
//! described at runtime (size plus construct/destruct thunks), so game and
//! tool code can attach typed data without a class hierarchy per entity
//! kind, and systems that only hold a descriptor can still read and write
//! through the erased entry points.
//!
//! Aspect creation is broadcast to an injected handler so dependent systems
//! can react to new data appearing.
//!
//! Not thread-safe: a world belongs to one owning thread.

mod aspect;
mod entity;
mod world;

pub use aspect::AspectType;
pub use entity::EntityId;
pub use world::{AspectEvent, BroadcastHandler, EntityWorld};
