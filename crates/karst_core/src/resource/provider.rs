//! # Resource Classes, Flags and Providers
//!
//! A *resource class* is the runtime tag for a concrete resource type; a
//! *provider* is the factory registered for one or more classes. The
//! manager never constructs resources itself.

use std::any::TypeId;
use std::hash::{Hash, Hasher};
use std::ops::BitOr;

use super::error::ResourceError;
use super::manager::ResourceManager;
use super::state::Resource;

/// Runtime tag identifying a concrete resource type.
///
/// Identity is the Rust type; the name rides along for diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct ResourceClass {
    id: TypeId,
    name: &'static str,
}

impl ResourceClass {
    /// The class of the resource type `T`.
    #[must_use]
    pub fn of<T: Resource>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Human-readable class name for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ResourceClass {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ResourceClass {}

impl Hash for ResourceClass {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Request flags for [`ResourceManager::get_resource`].
///
/// Combine with `|`: `GetResourceFlags::REQUIRED | GetResourceFlags::PRIVATE`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GetResourceFlags(u32);

impl GetResourceFlags {
    /// No flags: create on miss, tolerate failure silently.
    pub const NONE: Self = Self(0);
    /// The caller cannot proceed without this resource; a miss that cannot
    /// be served becomes an error instead of `None`.
    pub const REQUIRED: Self = Self(1);
    /// Only return a cached resource; a miss creates nothing.
    pub const NEVER_CREATE: Self = Self(1 << 1);
    /// Do not cache under the recipe key; the section owns the instance
    /// exclusively and later identical requests create fresh instances.
    pub const PRIVATE: Self = Self(1 << 2);

    /// Whether every flag in `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for GetResourceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Factory for one or more resource classes.
///
/// Providers are registered with
/// [`ResourceManager::register_provider`] and looked up by class on every
/// cache miss. A provider may itself request sub-resources through the
/// manager it is handed.
pub trait ResourceProvider {
    /// Constructs a fresh resource for `class` from `recipe`.
    ///
    /// The returned resource starts at
    /// [`ResourceState::Created`](super::ResourceState::Created); the
    /// manager drives it toward the target state afterwards.
    ///
    /// # Errors
    ///
    /// Returns a [`ResourceError`] when the recipe cannot be served (bad
    /// parameters, unknown class variant, missing source data).
    fn create_resource(
        &self,
        manager: &mut ResourceManager,
        class: ResourceClass,
        recipe: &str,
        flags: GetResourceFlags,
    ) -> Result<Box<dyn Resource>, ResourceError>;
}
