//! Live-update hooks for Dioxus components.
//!
//! NOTE: These hooks are kept minimal. Components should NOT read pushed
//! events directly. Events invalidate the query cache, and components re-fetch
//! whatever went stale.

use std::rc::Rc;

use dioxus::prelude::*;

use super::connection::ConnectionState;
use super::manager::LiveHandle;
use crate::stores::QueryCache;

/// Hook that keeps the live channel open while the calling component is
/// mounted.
///
/// # Returns
/// The current connection state (reactive - updates when state changes). A
/// component can use it to enable a polling fallback while disconnected.
pub fn use_live_updates(handle: &LiveHandle) -> Signal<ConnectionState> {
    let subscription = use_hook(|| Rc::new(handle.subscribe()));
    let mut state = use_signal(|| subscription.state());

    use_hook(|| {
        let mut changes = subscription.state_receiver();
        spawn(async move {
            while changes.changed().await.is_ok() {
                let current = *changes.borrow_and_update();
                state.set(current);
            }
        });
    });

    state
}

/// Hook to observe cache invalidations.
///
/// # Returns
/// The cache generation (reactive - bumps whenever an event marks something
/// stale). Read it inside a resource to re-fetch on invalidation.
pub fn use_cache_generation(cache: &QueryCache) -> Signal<u64> {
    let mut generation = use_signal(|| cache.generation());

    use_hook(|| {
        let mut changes = cache.changes();
        spawn(async move {
            while changes.changed().await.is_ok() {
                let current = *changes.borrow_and_update();
                generation.set(current);
            }
        });
    });

    generation
}
