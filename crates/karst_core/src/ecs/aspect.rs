//! # Aspect Type Descriptors
//!
//! An [`AspectType`] is the runtime description of one aspect struct: its
//! identity, layout and two type-erased operations - clone-construct from a
//! source value and drop in place. It is the minimal manual vtable that
//! lets a pool hold any aspect without knowing its Rust type.
//!
//! ## Safety Note
//!
//! This module requires unsafe code for the monomorphized thunks behind the
//! descriptor. All unsafe blocks are carefully reviewed and documented.

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::any::TypeId;

/// Clone-constructs the value at `src` into `dst`.
type ConstructFromFn = unsafe fn(*mut u8, *const u8);

/// Drops the value at `dst` in place.
type DestructFn = unsafe fn(*mut u8);

/// Runtime descriptor for an aspect struct.
///
/// Two descriptors built from the same Rust type are interchangeable:
/// identity is the [`TypeId`] key, not the descriptor instance.
#[derive(Clone, Copy, Debug)]
pub struct AspectType {
    key: TypeId,
    name: &'static str,
    layout: Layout,
    construct_from: ConstructFromFn,
    destruct: DestructFn,
}

impl AspectType {
    /// Builds the descriptor for the aspect struct `T`.
    #[must_use]
    pub fn of<T: Clone + 'static>() -> Self {
        Self {
            key: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            layout: Layout::new::<T>(),
            construct_from: construct_thunk::<T>,
            destruct: destruct_thunk::<T>,
        }
    }

    /// Stable identity of the described type.
    #[inline]
    #[must_use]
    pub fn key(&self) -> TypeId {
        self.key
    }

    /// Human-readable type name for diagnostics.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Size and alignment of one aspect value.
    #[inline]
    #[must_use]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Clone-constructs the value at `src` into `dst`.
    ///
    /// # Safety
    ///
    /// `src` must point at a live value of the described type; `dst` must
    /// be valid for this type's layout and must not hold a live value.
    pub(crate) unsafe fn construct_from(&self, dst: *mut u8, src: *const u8) {
        (self.construct_from)(dst, src);
    }

    /// Drops the value at `dst` in place.
    ///
    /// # Safety
    ///
    /// `dst` must point at a live value of the described type.
    pub(crate) unsafe fn destruct(&self, dst: *mut u8) {
        (self.destruct)(dst);
    }
}

unsafe fn construct_thunk<T: Clone>(dst: *mut u8, src: *const u8) {
    dst.cast::<T>().write((*src.cast::<T>()).clone());
}

unsafe fn destruct_thunk<T>(dst: *mut u8) {
    std::ptr::drop_in_place(dst.cast::<T>());
}
