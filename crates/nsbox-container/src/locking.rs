//! Process-wide lock registry keyed by container identity.
//!
//! The native engine's per-process global state is not safe for concurrent
//! mutation, so every engine call for a given identity runs under that
//! identity's registry entry. Distinct identities never contend, which
//! preserves cross-identity parallelism (a single global lock would not).
//!
//! Entries are reference-counted by the handles bound to their identity and
//! reclaimed from the table at refcount zero. A holder in the middle of a
//! critical section keeps its own `Arc` to the entry, so reclamation can
//! never drop a lock out from under an in-flight guard. `lock()` is meant
//! to be called by code paths holding a `retain()` on the same identity for
//! the duration; a slot it had to create anyway (no surrounding retain) is
//! reclaimed when its guard drops, so such calls cannot leak entries.
//!
//! Misuse (releasing an identity that was never retained, dropping a guard
//! whose entry is not held) is a programming error, not a runtime
//! condition: it trips debug assertions instead of returning `Result`.

use nsbox_engine::ContainerIdentity;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};

struct LockEntry {
    held: Mutex<bool>,
    unlocked: Condvar,
}

struct EntrySlot {
    entry: Arc<LockEntry>,
    refs: usize,
}

type Registry = Mutex<HashMap<ContainerIdentity, EntrySlot>>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Scoped exclusive hold of one identity's lock entry.
///
/// Dropping the guard releases the entry on every exit path, including
/// unwinding.
pub(crate) struct IdentityGuard {
    entry: Arc<LockEntry>,
    id: ContainerIdentity,
}

impl Drop for IdentityGuard {
    fn drop(&mut self) {
        {
            let mut held = self
                .entry
                .held
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            debug_assert!(*held, "identity lock released without being held");
            *held = false;
        }
        self.entry.unlocked.notify_one();

        // Reclaim a slot nothing references: one that only existed because
        // lock() was called without a surrounding retain() would otherwise
        // stay in the table forever.
        let mut map = registry().lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = map.get(&self.id) {
            let in_use = slot.refs > 0
                || *slot
                    .entry
                    .held
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
            if !in_use {
                map.remove(&self.id);
            }
        }
    }
}

/// Blocks until no other caller holds `id`'s entry, then takes it.
///
/// Acquisition never fails; it only blocks. Callers on different
/// identities are never blocked by each other.
pub(crate) fn lock(id: &ContainerIdentity) -> IdentityGuard {
    let entry = {
        let mut map = registry().lock().unwrap_or_else(PoisonError::into_inner);
        let slot = map.entry(id.clone()).or_insert_with(|| EntrySlot {
            entry: Arc::new(LockEntry {
                held: Mutex::new(false),
                unlocked: Condvar::new(),
            }),
            refs: 0,
        });
        Arc::clone(&slot.entry)
    };

    let mut held = entry.held.lock().unwrap_or_else(PoisonError::into_inner);
    while *held {
        held = entry
            .unlocked
            .wait(held)
            .unwrap_or_else(PoisonError::into_inner);
    }
    *held = true;
    drop(held);

    IdentityGuard {
        entry,
        id: id.clone(),
    }
}

/// Binds one more handle to `id`'s entry, creating it on first use.
pub(crate) fn retain(id: &ContainerIdentity) {
    let mut map = registry().lock().unwrap_or_else(PoisonError::into_inner);
    map.entry(id.clone())
        .or_insert_with(|| EntrySlot {
            entry: Arc::new(LockEntry {
                held: Mutex::new(false),
                unlocked: Condvar::new(),
            }),
            refs: 0,
        })
        .refs += 1;
}

/// Unbinds a handle from `id`'s entry, reclaiming it at refcount zero.
pub(crate) fn release(id: &ContainerIdentity) {
    let mut map = registry().lock().unwrap_or_else(PoisonError::into_inner);
    let Some(slot) = map.get_mut(id) else {
        debug_assert!(false, "released identity {id} that was never retained");
        return;
    };
    debug_assert!(slot.refs > 0, "refcount underflow for identity {id}");
    slot.refs = slot.refs.saturating_sub(1);
    if slot.refs == 0 {
        map.remove(id);
    }
}

#[cfg(test)]
fn entry_exists(id: &ContainerIdentity) -> bool {
    registry()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .contains_key(id)
}
