//! Generational object arenas
//!
//! Kernel objects (threads, timers, primitives) live in fixed-capacity
//! arenas and are referred to by [`Handle`]s: a slot index plus a
//! generation counter. Freed slots are reused; the generation bump makes
//! a handle to the old occupant stale instead of silently aliasing the
//! new one. This preserves the O(1) link/unlink of intrusive lists while
//! keeping the kernel free of raw pointers.

use core::fmt;
use core::marker::PhantomData;

use heapless::Vec;
use rtk_core::{KernelError, KernelResult};

/// Typed handle into an [`Arena`].
pub struct Handle<T> {
    index: u8,
    generation: u8,
    _marker: PhantomData<fn() -> T>,
}

// Manual impls: deriving would put unnecessary bounds on `T`.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Handle<T> {}
impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}
impl<T> Eq for Handle<T> {}

impl<T> Handle<T> {
    const fn new(index: u8, generation: u8) -> Self {
        Handle {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Slot index, stable for the lifetime of the object.
    pub const fn index(self) -> usize {
        self.index as usize
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.index, self.generation)
    }
}

#[cfg(feature = "defmt")]
impl<T> defmt::Format for Handle<T> {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "#{}:{}", self.index, self.generation);
    }
}

struct Slot<T> {
    generation: u8,
    value: Option<T>,
}

/// Fixed-capacity arena of `T` with generational handles.
pub struct Arena<T, const N: usize> {
    slots: Vec<Slot<T>, N>,
}

impl<T, const N: usize> Arena<T, N> {
    pub const fn new() -> Self {
        Arena { slots: Vec::new() }
    }

    /// Places `value` into a free slot and returns its handle.
    pub fn alloc(&mut self, value: T) -> KernelResult<Handle<T>> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.is_none() {
                slot.value = Some(value);
                return Ok(Handle::new(index as u8, slot.generation));
            }
        }
        let index = self.slots.len();
        self.slots
            .push(Slot {
                generation: 0,
                value: Some(value),
            })
            .map_err(|_| KernelError::NoFreeObject)?;
        Ok(Handle::new(index as u8, 0))
    }

    /// Removes the object behind `handle`, invalidating the handle.
    pub fn free(&mut self, handle: Handle<T>) -> Option<T> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take();
        if value.is_some() {
            slot.generation = slot.generation.wrapping_add(1);
        }
        value
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        let slot = self.slots.get(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Checks that `handle` still refers to a live object.
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over the handles of all live objects.
    pub fn handles(&self) -> impl Iterator<Item = Handle<T>> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|_| Handle::new(index as u8, slot.generation))
        })
    }
}

impl<T, const N: usize> Default for Arena<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
