//! Fixed-capacity object pool
//!
//! Slots are allocated up front. The free list is a lock-free bounded queue
//! of slot indices, so acquire and release are safe from every worker at
//! once without a pool-wide lock.
//!
//! # Generations
//! Each slot carries a generation counter. Odd values mean the slot is
//! live, even values mean it is free. A [`Handle`] records the generation it
//! was issued with, which makes stale handles (use after release, double
//! release) detectable instead of silently aliasing a reused slot.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::mem;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crossbeam::queue::ArrayQueue;

use super::{MemoryReservation, MemoryTracker};
use crate::error::{Error, ObjectKind, Result};

/// Most slots a pool can index.
pub const MAX_CAPACITY: usize = u32::MAX as usize;

/// An object that can live in a [`Pool`].
pub trait Poolable: Send + Sync + 'static {
    /// Kind reported in errors.
    const KIND: ObjectKind;

    /// Return the object to its pristine state before the slot is reused.
    fn reset(&self);

    /// Storage held by one slot, including buffers preallocated per slot.
    fn reserved_bytes(&self) -> usize {
        mem::size_of_val(self)
    }
}

/// Generation-checked index into a [`Pool`].
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    #[inline]
    fn new(
        index: u32,
        generation: u32,
    ) -> Self {
        Self {
            index,
            generation,
            _kind: PhantomData,
        }
    }

    /// Slot index.
    #[inline]
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Generation the handle was issued with.
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T: Poolable> fmt::Debug for Handle<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}#{}.{}", T::KIND, self.index, self.generation)
    }
}

impl<T: Poolable> fmt::Display for Handle<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

struct Slot<T> {
    generation: AtomicU32,
    value: T,
}

/// Fixed-capacity pool of `T`.
pub struct Pool<T: Poolable> {
    slots: Box<[Slot<T>]>,
    free: ArrayQueue<u32>,
    in_use: AtomicUsize,
    tracker: MemoryTracker,
    _storage: MemoryReservation,
}

impl<T: Poolable> Pool<T> {
    /// Create a pool of `capacity` slots, each built by `init`.
    ///
    /// Capacities beyond [`MAX_CAPACITY`] are clamped to it.
    pub fn new(
        capacity: usize,
        tracker: &MemoryTracker,
        mut init: impl FnMut() -> T,
    ) -> Self {
        let capacity = capacity.min(MAX_CAPACITY);
        let slots: Box<[Slot<T>]> = (0..capacity)
            .map(|_| Slot {
                generation: AtomicU32::new(0),
                value: init(),
            })
            .collect();

        let free = ArrayQueue::new(capacity.max(1));
        for index in 0..capacity {
            // Cannot fail: the queue was sized to hold every index.
            let _ = free.push(index as u32);
        }

        let storage: usize = slots.iter().map(|s| s.value.reserved_bytes()).sum();
        let storage = storage + free.capacity() * mem::size_of::<u32>();

        Self {
            slots,
            free,
            in_use: AtomicUsize::new(0),
            tracker: tracker.clone(),
            _storage: tracker.reserve(storage),
        }
    }

    /// Take a free slot.
    ///
    /// Fails with [`Error::Exhausted`] when every slot is live; the pool is
    /// left unchanged in that case.
    pub fn acquire(&self) -> Result<Handle<T>> {
        let index = self.free.pop().ok_or(Error::Exhausted(T::KIND))?;
        let slot = &self.slots[index as usize];
        // Only the thread that popped the index touches a free slot's
        // generation, so the bump from even to odd cannot race.
        let generation = slot.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug_assert!(generation % 2 == 1);

        self.in_use.fetch_add(1, Ordering::SeqCst);
        self.tracker.record_acquire(mem::size_of::<T>());
        Ok(Handle::new(index, generation))
    }

    /// Resolve a handle to its object.
    pub fn get(
        &self,
        handle: Handle<T>,
    ) -> Result<&T> {
        let slot = self
            .slots
            .get(handle.index())
            .ok_or(Error::InvalidHandle(T::KIND))?;
        if slot.generation.load(Ordering::Acquire) != handle.generation {
            return Err(Error::InvalidHandle(T::KIND));
        }
        Ok(&slot.value)
    }

    /// Whether the handle still refers to a live object.
    #[inline]
    pub fn contains(
        &self,
        handle: Handle<T>,
    ) -> bool {
        self.get(handle).is_ok()
    }

    /// Return a slot to the free list.
    ///
    /// Exactly one release succeeds per acquire; later ones see a stale
    /// generation and report [`Error::InvalidHandle`].
    pub fn release(
        &self,
        handle: Handle<T>,
    ) -> Result<()> {
        let slot = self
            .slots
            .get(handle.index())
            .ok_or(Error::InvalidHandle(T::KIND))?;
        slot.generation
            .compare_exchange(
                handle.generation,
                handle.generation.wrapping_add(1),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| Error::InvalidHandle(T::KIND))?;

        slot.value.reset();
        self.in_use.fetch_sub(1, Ordering::SeqCst);
        self.tracker.record_release(mem::size_of::<T>());

        if self.free.push(handle.index).is_err() {
            unreachable!("{} pool free list overflow", T::KIND);
        }
        Ok(())
    }

    /// Handles of every live slot at the time of the call.
    pub fn live_handles(&self) -> Vec<Handle<T>> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let generation = slot.generation.load(Ordering::Acquire);
                (generation % 2 == 1).then(|| Handle::new(index as u32, generation))
            })
            .collect()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live objects.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

impl<T: Poolable> fmt::Debug for Pool<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Pool")
            .field("kind", &T::KIND)
            .field("capacity", &self.capacity())
            .field("in_use", &self.in_use())
            .finish()
    }
}
