//! Handle store for objects that cross the FFI boundary
//!
//! Native structures handed to SQLite never carry Rust pointers. They carry a
//! [`Handle`], an opaque word that indexes a slot in a [`HandleStore`]. Each
//! slot has a generation counter, so a handle that has been released can never
//! resolve to whatever object later reuses the slot.
//!
//! Resolution failures are bridge defects, not user errors: [`HandleStore::resolve`]
//! and [`HandleStore::release`] panic on a handle that is not live.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

const INDEX_BITS: u32 = usize::BITS / 2;
const INDEX_MASK: usize = (1 << INDEX_BITS) - 1;
const GENERATION_MASK: usize = usize::MAX >> INDEX_BITS;

/// Opaque identifier of a live object in a [`HandleStore`]
///
/// A machine word: the low half holds the slot index plus one (so zero is
/// never a valid handle) and the high half holds the slot generation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Handle(usize);

impl Handle {
    fn new(index: usize, generation: usize) -> Self {
        Handle((generation << INDEX_BITS) | (index + 1))
    }

    /// Reconstruct a handle from its raw word
    pub fn from_raw(raw: usize) -> Self {
        Handle(raw)
    }

    /// Raw word suitable for storing in native structures
    pub fn as_raw(self) -> usize {
        self.0
    }

    fn index(self) -> Option<usize> {
        (self.0 & INDEX_MASK).checked_sub(1)
    }

    fn generation(self) -> usize {
        self.0 >> INDEX_BITS
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index() {
            Some(index) => write!(f, "Handle({}v{})", index, self.generation()),
            None => write!(f, "Handle(null)"),
        }
    }
}

struct Slot<T> {
    generation: usize,
    value: Option<Arc<T>>,
}

struct Slots<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    live: usize,
}

/// Arena of live objects addressed by [`Handle`]
///
/// Register, resolve and release are each atomic with respect to each other,
/// so one store may be shared by every connection in the process. The store
/// never decides lifetimes; the owner releases each handle exactly once.
pub struct HandleStore<T> {
    inner: Mutex<Slots<T>>,
}

impl<T> HandleStore<T> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Slots {
                slots: Vec::new(),
                free: Vec::new(),
                live: 0,
            }),
        }
    }

    /// Store an object and return the handle that now names it
    pub fn register(&self, value: T) -> Handle {
        let mut inner = self.inner.lock();
        inner.live += 1;

        if let Some(index) = inner.free.pop() {
            let slot = &mut inner.slots[index];
            slot.value = Some(Arc::new(value));
            return Handle::new(index, slot.generation);
        }

        let index = inner.slots.len();
        assert!(index < INDEX_MASK, "handle store exhausted");
        inner.slots.push(Slot {
            generation: 0,
            value: Some(Arc::new(value)),
        });
        Handle::new(index, 0)
    }

    /// Look up a live object
    ///
    /// # Panics
    ///
    /// Panics if `handle` was never registered or has already been released.
    pub fn resolve(&self, handle: Handle) -> Arc<T> {
        let value = Self::slot(&self.inner.lock(), handle).cloned();
        value.unwrap_or_else(|| panic!("resolve of dead handle {:?}", handle))
    }

    /// Remove an object, returning it to the caller for final teardown
    ///
    /// # Panics
    ///
    /// Panics if `handle` is not live, including on a second release.
    pub fn release(&self, handle: Handle) -> Arc<T> {
        let mut inner = self.inner.lock();
        let index = match (Self::slot(&inner, handle).is_some(), handle.index()) {
            (true, Some(index)) => index,
            _ => panic!("release of dead handle {:?}", handle),
        };

        let slot = &mut inner.slots[index];
        let value = slot.value.take();
        slot.generation = slot.generation.wrapping_add(1) & GENERATION_MASK;
        inner.free.push(index);
        inner.live -= 1;

        value.unwrap_or_else(|| unreachable!("slot checked live above"))
    }

    /// True if `handle` currently names a live object
    pub fn contains(&self, handle: Handle) -> bool {
        Self::slot(&self.inner.lock(), handle).is_some()
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.inner.lock().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(inner: &Slots<T>, handle: Handle) -> Option<&Arc<T>> {
        let slot = inner.slots.get(handle.index()?)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_ref()
    }
}

impl<T> Default for HandleStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
