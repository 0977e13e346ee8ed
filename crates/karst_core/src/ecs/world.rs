//! # Entity World
//!
//! Maps entity ids to per-type aspect pools and broadcasts aspect creation
//! to an injected handler. Each pool owns one raw allocation per entity
//! that carries the aspect; replacing a value destructs the old one in
//! place and reconstructs, so pointers handed out earlier stay valid for
//! the entity's lifetime.
//!
//! ## Safety Note
//!
//! This module requires unsafe code for the type-erased aspect storage.
//! All unsafe blocks are carefully reviewed and documented. The invariant
//! throughout: a pool's blocks always hold a live, initialized value of
//! the pool's aspect type, allocated with that type's layout.

#![allow(unsafe_code)]

use std::alloc::{alloc, dealloc};
use std::any::TypeId;
use std::collections::HashMap;
use std::ptr::NonNull;

use super::aspect::AspectType;
use super::entity::EntityId;

/// Lifecycle notifications emitted for aspects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AspectEvent {
    /// The aspect was set on an entity that did not have it before.
    /// Replacing an existing value emits nothing.
    Created,
}

/// Receives aspect lifecycle events from a world.
///
/// Delivery order across aspect types is unspecified; within one aspect
/// type, events arrive in the order the mutations happened.
pub trait BroadcastHandler {
    /// Called after an aspect value first appears on an entity.
    fn aspect_event(&mut self, entity: EntityId, aspect: &AspectType, event: AspectEvent);
}

/// Per-aspect-type storage: entity id to one raw block of the aspect's
/// layout.
// TODO: replace the per-instance allocations with a dense per-type column
struct AspectPool {
    ty: AspectType,
    slots: HashMap<EntityId, NonNull<u8>>,
}

impl AspectPool {
    fn new(ty: AspectType) -> Self {
        Self {
            ty,
            slots: HashMap::new(),
        }
    }

    fn get(&self, entity: EntityId) -> Option<NonNull<u8>> {
        self.slots.get(&entity).copied()
    }

    /// Returns the entity's block, allocating an uninitialized one on first
    /// use. The bool reports whether the block is fresh (and therefore not
    /// yet constructed).
    fn get_or_alloc(&mut self, entity: EntityId) -> (NonNull<u8>, bool) {
        if let Some(&block) = self.slots.get(&entity) {
            return (block, false);
        }

        let layout = self.ty.layout();
        let block = if layout.size() == 0 {
            NonNull::dangling()
        } else {
            // SAFETY: the layout has nonzero size.
            let raw = unsafe { alloc(layout) };
            assert!(!raw.is_null(), "aspect allocation failed");
            // SAFETY: null was just ruled out.
            unsafe { NonNull::new_unchecked(raw) }
        };
        self.slots.insert(entity, block);
        (block, true)
    }
}

impl Drop for AspectPool {
    fn drop(&mut self) {
        let ty = self.ty;
        for (_, block) in self.slots.drain() {
            // SAFETY: every stored block holds a live value of `ty`.
            unsafe {
                ty.destruct(block.as_ptr());
                if ty.layout().size() != 0 {
                    dealloc(block.as_ptr(), ty.layout());
                }
            }
        }
    }
}

/// Container mapping entity ids to typed aspect data.
pub struct EntityWorld {
    broadcast: Option<Box<dyn BroadcastHandler>>,
    next_id: EntityId,
    pools: HashMap<TypeId, AspectPool>,
}

impl EntityWorld {
    /// Creates an empty world with no broadcast handler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            broadcast: None,
            next_id: EntityId::first(),
            pools: HashMap::new(),
        }
    }

    /// Creates an empty world that reports aspect events to `broadcast`.
    #[must_use]
    pub fn with_broadcast(broadcast: Box<dyn BroadcastHandler>) -> Self {
        Self {
            broadcast: Some(broadcast),
            ..Self::new()
        }
    }

    /// Issues the next entity id. Ids are never reused.
    pub fn create_entity(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id = id.next();
        id
    }

    /// Present for interface symmetry; aspect pools are deliberately NOT
    /// reclaimed here. A destroyed entity's aspects stay resident until the
    /// world goes away - callers that need the memory back must overwrite
    /// the values or drop the world. Known limitation.
    pub fn destroy_entity(&mut self, _entity: EntityId) {}

    /// The entity's aspect value, if it was ever set.
    #[must_use]
    pub fn get<T: Clone + 'static>(&self, entity: EntityId) -> Option<&T> {
        let block = self.pools.get(&TypeId::of::<T>())?.get(entity)?;
        // SAFETY: blocks in T's pool hold live, initialized `T` values.
        Some(unsafe { block.cast::<T>().as_ref() })
    }

    /// Mutable access to the entity's aspect value, if it was ever set.
    #[must_use]
    pub fn get_mut<T: Clone + 'static>(&mut self, entity: EntityId) -> Option<&mut T> {
        let block = self.pools.get(&TypeId::of::<T>())?.get(entity)?;
        // SAFETY: as in `get`; `&mut self` gives exclusive access.
        Some(unsafe { block.cast::<T>().as_mut() })
    }

    /// Clone-constructs `value` into the entity's slot for `T`.
    ///
    /// If the entity already carries a `T`, the old value is destructed in
    /// place first and no event is emitted; the first value for an entity
    /// broadcasts [`AspectEvent::Created`].
    pub fn set<T: Clone + 'static>(&mut self, entity: EntityId, value: &T) {
        // SAFETY: `value` is a live `T` and the descriptor is `T`'s.
        unsafe {
            self.set_raw(
                entity,
                &AspectType::of::<T>(),
                (value as *const T).cast::<u8>(),
            );
        }
    }

    /// Erased lookup for callers that only hold a descriptor. Returns the
    /// entity's stored block; it remains valid as long as the world exists.
    #[must_use]
    pub fn get_raw(&self, entity: EntityId, ty: &AspectType) -> Option<NonNull<u8>> {
        self.pools.get(&ty.key())?.get(entity)
    }

    /// Erased counterpart of [`set`](Self::set).
    ///
    /// # Safety
    ///
    /// `src` must point at a live value of the type `ty` describes. The
    /// value is cloned; the caller keeps ownership of the original.
    pub unsafe fn set_raw(&mut self, entity: EntityId, ty: &AspectType, src: *const u8) {
        let pool = self
            .pools
            .entry(ty.key())
            .or_insert_with(|| AspectPool::new(*ty));
        let (block, was_created) = pool.get_or_alloc(entity);

        if !was_created {
            // SAFETY: a non-fresh block holds a live value of `ty`.
            ty.destruct(block.as_ptr());
        }
        // SAFETY: the block has `ty`'s layout and holds no live value here.
        ty.construct_from(block.as_ptr(), src);

        if was_created {
            if let Some(broadcast) = self.broadcast.as_mut() {
                broadcast.aspect_event(entity, ty, AspectEvent::Created);
            }
        }
    }

    /// Visits every entity currently carrying a `T`. Iteration order is
    /// unspecified.
    pub fn for_each<T: Clone + 'static>(&self, mut f: impl FnMut(EntityId, &T)) {
        if let Some(pool) = self.pools.get(&TypeId::of::<T>()) {
            for (&entity, block) in &pool.slots {
                // SAFETY: blocks in T's pool hold live, initialized `T`s.
                f(entity, unsafe { block.cast::<T>().as_ref() });
            }
        }
    }
}

impl Default for EntityWorld {
    fn default() -> Self {
        Self::new()
    }
}
