//! Memory management for values and evaluation-scoped allocations.
//!
//! Two disciplines share one placement API:
//!
//! - **Reference counting**: each allocation carries an atomic strong count
//!   and is destroyed eagerly when the last handle drops.
//! - **Pooling**: allocations bump into a shared region; the region is
//!   freed as a whole once the pool and every handle into it have dropped.
//!   Destructors are recorded only for types that need them
//!   ([`std::mem::needs_drop`]) and run in reverse allocation order at
//!   teardown.
//!
//! Every allocation the factory or a builder makes passes through the
//! manager: list, map, and struct payloads are [`Handle`]s produced by
//! [`MemoryManager::allocate`] / [`MemoryManager::allocate_slice`].
//! Plain value constructors that have no manager in scope (literals,
//! `From` impls) default to the reference-counting discipline, so values
//! themselves never carry the discipline — the manager reference travels
//! with the factory and the evaluation. Mixing handles from two managers
//! within one evaluation is undefined (the managers do not check for it).
//!
//! `Handle` follows `Arc`'s threading contract: it is `Send`/`Sync` when
//! the pointee is, and hands out shared references only. The pooling
//! region serializes its bump pointer and destructor list internally.

use std::fmt;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use bumpalo::Bump;

/// The allocator carried by factories and evaluations.
#[derive(Clone)]
pub struct MemoryManager {
    discipline: Discipline,
}

#[derive(Clone)]
enum Discipline {
    ReferenceCounting,
    Pooling(Pool),
}

impl MemoryManager {
    /// A manager whose allocations are individually reference-counted.
    pub fn reference_counting() -> Self {
        Self {
            discipline: Discipline::ReferenceCounting,
        }
    }

    /// A manager whose allocations bump into a fresh shared region.
    pub fn pooling() -> Self {
        Self {
            discipline: Discipline::Pooling(Pool::new()),
        }
    }

    /// Returns true for the pooling discipline.
    pub fn is_pooling(&self) -> bool {
        matches!(self.discipline, Discipline::Pooling(_))
    }

    /// Construct `value` in place under the active discipline.
    pub fn allocate<T>(&self, value: T) -> Handle<T> {
        match &self.discipline {
            Discipline::ReferenceCounting => Handle {
                repr: Repr::Shared(Arc::new(value)),
            },
            Discipline::Pooling(pool) => pool.allocate(value),
        }
    }

    /// Construct a slice in place under the active discipline; used for
    /// list storage.
    pub fn allocate_slice<T>(&self, items: Vec<T>) -> Handle<[T]> {
        match &self.discipline {
            Discipline::ReferenceCounting => Handle {
                repr: Repr::Shared(Arc::from(items)),
            },
            Discipline::Pooling(pool) => pool.allocate_slice(items),
        }
    }

    /// Reserve `size` bytes at `align` for a caller that manages its own
    /// construction and destruction. Only the pooling discipline hands out
    /// raw placements; reference counting returns `None`.
    ///
    /// Callers that place destruction-required objects into the region must
    /// pair this with [`MemoryManager::register_destructor`].
    pub fn allocate_raw(&self, size: usize, align: usize) -> Option<NonNull<u8>> {
        match &self.discipline {
            Discipline::ReferenceCounting => None,
            Discipline::Pooling(pool) => Some(pool.allocate_raw(size, align)),
        }
    }

    /// Record a destructor to run at region teardown. No-op under reference
    /// counting, where destructors run when the strong count hits zero.
    ///
    /// # Safety
    ///
    /// `pointer` must come from [`MemoryManager::allocate_raw`] on this
    /// manager and hold an initialized object that `drop_fn` destroys
    /// exactly once.
    pub unsafe fn register_destructor(
        &self,
        pointer: NonNull<u8>,
        drop_fn: unsafe fn(*mut u8),
    ) {
        if let Discipline::Pooling(pool) = &self.discipline {
            pool.push_destructor(Destructor {
                pointer: pointer.as_ptr(),
                drop_fn,
            });
        }
    }
}

impl fmt::Debug for MemoryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.discipline {
            Discipline::ReferenceCounting => f.write_str("MemoryManager(reference_counting)"),
            Discipline::Pooling(_) => f.write_str("MemoryManager(pooling)"),
        }
    }
}

/// A bump region shared by the pooling manager and its handles.
#[derive(Clone)]
struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    bump: Mutex<Bump>,
    destructors: Mutex<Vec<Destructor>>,
}

struct Destructor {
    pointer: *mut u8,
    drop_fn: unsafe fn(*mut u8),
}

// The pointer targets the region owned by the same `PoolInner`, and the
// destructor list only runs once, at teardown, under the region's lock.
unsafe impl Send for Destructor {}

impl Pool {
    fn new() -> Self {
        Self {
            inner: Arc::new(PoolInner {
                bump: Mutex::new(Bump::new()),
                destructors: Mutex::new(Vec::new()),
            }),
        }
    }

    fn allocate<T>(&self, value: T) -> Handle<T> {
        let ptr = {
            let bump = self.inner.bump.lock().expect("bump region poisoned");
            NonNull::from(bump.alloc(value))
        };
        if std::mem::needs_drop::<T>() {
            self.push_destructor(Destructor {
                pointer: ptr.as_ptr().cast(),
                drop_fn: drop_in_place_erased::<T>,
            });
        }
        Handle {
            repr: Repr::Pooled {
                ptr,
                pool: self.clone(),
            },
        }
    }

    fn allocate_slice<T>(&self, items: Vec<T>) -> Handle<[T]> {
        let len = items.len();
        let ptr = {
            let bump = self.inner.bump.lock().expect("bump region poisoned");
            NonNull::from(bump.alloc_slice_fill_iter(items))
        };
        if std::mem::needs_drop::<T>() {
            let base = ptr.as_ptr() as *mut T;
            let mut destructors = self
                .inner
                .destructors
                .lock()
                .expect("destructor list poisoned");
            for i in 0..len {
                destructors.push(Destructor {
                    pointer: unsafe { base.add(i) }.cast(),
                    drop_fn: drop_in_place_erased::<T>,
                });
            }
        }
        Handle {
            repr: Repr::Pooled {
                ptr,
                pool: self.clone(),
            },
        }
    }

    fn allocate_raw(&self, size: usize, align: usize) -> NonNull<u8> {
        let layout = std::alloc::Layout::from_size_align(size.max(1), align)
            .expect("invalid allocation layout");
        let bump = self.inner.bump.lock().expect("bump region poisoned");
        bump.alloc_layout(layout)
    }

    fn push_destructor(&self, destructor: Destructor) {
        self.inner
            .destructors
            .lock()
            .expect("destructor list poisoned")
            .push(destructor);
    }
}

unsafe fn drop_in_place_erased<T>(pointer: *mut u8) {
    std::ptr::drop_in_place(pointer.cast::<T>());
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        // Reverse allocation order, matching eager-destruction semantics
        // for objects that reference earlier allocations.
        let mut destructors = self
            .destructors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while let Some(destructor) = destructors.pop() {
            unsafe { (destructor.drop_fn)(destructor.pointer) };
        }
    }
}

/// A handle to an allocation made through a [`MemoryManager`].
///
/// Cloning shares storage: a reference-counted clone bumps the strong
/// count, a pooled clone is another pointer into the same region. The
/// pointee lives at least as long as any handle to it.
pub struct Handle<T: ?Sized> {
    repr: Repr<T>,
}

enum Repr<T: ?Sized> {
    Shared(Arc<T>),
    Pooled {
        ptr: NonNull<T>,
        // Keeps the region containing the pointee alive.
        pool: Pool,
    },
}

// Same contract as `Arc`: handles hand out shared references only, and a
// handle dropped on another thread may be the one to tear the region
// down, so both `Send` and `Sync` require `T: Send + Sync`.
unsafe impl<T: ?Sized + Send + Sync> Send for Handle<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for Handle<T> {}

impl<T: ?Sized> Handle<T> {
    /// The shared allocation, if this handle is reference-counted.
    pub fn as_shared(&self) -> Option<&Arc<T>> {
        match &self.repr {
            Repr::Shared(arc) => Some(arc),
            Repr::Pooled { .. } => None,
        }
    }

    /// Returns true if this handle points into a pooled region.
    pub fn is_pooled(&self) -> bool {
        matches!(self.repr, Repr::Pooled { .. })
    }
}

impl<T: ?Sized> From<Arc<T>> for Handle<T> {
    fn from(arc: Arc<T>) -> Self {
        Handle {
            repr: Repr::Shared(arc),
        }
    }
}

impl<T: ?Sized> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.repr {
            Repr::Shared(arc) => arc,
            // Valid: `pool` holds the region alive and pooled objects are
            // never destroyed before teardown.
            Repr::Pooled { ptr, .. } => unsafe { ptr.as_ref() },
        }
    }
}

impl<T: ?Sized> Clone for Handle<T> {
    fn clone(&self) -> Self {
        let repr = match &self.repr {
            Repr::Shared(arc) => Repr::Shared(Arc::clone(arc)),
            Repr::Pooled { ptr, pool } => Repr::Pooled {
                ptr: *ptr,
                pool: pool.clone(),
            },
        };
        Handle { repr }
    }
}

impl<T: ?Sized + PartialEq> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
