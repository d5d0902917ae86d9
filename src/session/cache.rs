use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::session::types::Profile;

/// Profile fetch shared by every caller waiting on it
pub(crate) type ProfileFetch = Shared<BoxFuture<'static, Option<Profile>>>;

#[derive(Default)]
struct Slot {
    profile: Option<Profile>,
    in_flight: Option<ProfileFetch>,
    // Bumped on invalidation so fetches started earlier cannot repopulate the slot
    generation: u64,
}

/// Memoized profile with at most one fetch in flight.
///
/// The lock is only taken for check-and-set and never held across an await.
#[derive(Clone, Default)]
pub struct ProfileCache {
    slot: Arc<Mutex<Slot>>,
}

pub(crate) enum CacheState {
    Ready(Profile),
    Pending(ProfileFetch),
    /// Nothing cached or in flight as of this generation
    Empty(u64),
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The resolved profile, if any
    pub fn get(&self) -> Option<Profile> {
        self.slot.lock().profile.clone()
    }

    pub fn is_fetching(&self) -> bool {
        self.slot.lock().in_flight.is_some()
    }

    pub(crate) fn state(&self) -> CacheState {
        let slot = self.slot.lock();
        if let Some(profile) = &slot.profile {
            CacheState::Ready(profile.clone())
        } else if let Some(fetch) = &slot.in_flight {
            CacheState::Pending(fetch.clone())
        } else {
            CacheState::Empty(slot.generation)
        }
    }

    /// Start a fetch via `start` unless a profile or a fetch appeared meanwhile.
    ///
    /// Returns `None` without starting anything when the cache was invalidated
    /// after `generation` was read; the caller's view of the user is stale.
    /// `start` receives the generation the fetch must report back with.
    pub(crate) fn start_with<F>(&self, generation: u64, start: F) -> Option<ProfileFetch>
    where
        F: FnOnce(u64) -> ProfileFetch,
    {
        let mut slot = self.slot.lock();
        if slot.generation != generation {
            return None;
        }
        if let Some(profile) = &slot.profile {
            return Some(future::ready(Some(profile.clone())).boxed().shared());
        }
        if let Some(fetch) = &slot.in_flight {
            return Some(fetch.clone());
        }

        let fetch = start(generation);
        slot.in_flight = Some(fetch.clone());
        Some(fetch)
    }

    /// Record the outcome of the fetch started at `generation`
    pub(crate) fn finish(&self, generation: u64, profile: Option<Profile>) {
        let mut slot = self.slot.lock();
        if slot.generation != generation {
            tracing::debug!("Discarding profile fetched before the cache was invalidated");
            return;
        }
        slot.in_flight = None;
        if profile.is_some() {
            slot.profile = profile;
        }
    }

    /// Forget the profile and any fetch in flight
    pub fn invalidate(&self) {
        let mut slot = self.slot.lock();
        slot.profile = None;
        slot.in_flight = None;
        slot.generation = slot.generation.wrapping_add(1);
    }

    /// Shallow-merge `updates` into a cached profile; false if nothing is cached
    pub fn merge(&self, updates: &Map<String, Value>) -> bool {
        match self.slot.lock().profile.as_mut() {
            Some(profile) => {
                profile.merge(updates);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn set(&self, profile: Profile) {
        self.slot.lock().profile = Some(profile);
    }
}
