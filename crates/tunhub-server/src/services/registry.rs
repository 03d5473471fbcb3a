// ============================================
// File: crates/tunhub-server/src/services/registry.rs
// ============================================
//! # Connection Registry
//!
//! ## Creation Reason
//! Tracks every live client session and which session owns each claimed
//! address, so the router can turn a destination into an outbound queue.
//!
//! ## Main Functionality
//! - `ClientRegistry`: id → session and address → id maps
//! - Monotonic `ClientId` assignment
//! - Atomic purge of a session's addresses on removal
//!
//! ## Registry Layout
//! ```text
//! ┌──────────────── Mutex<RegistryInner> ────────────────┐
//! │                                                      │
//! │  clients: ClientId ──► Arc<ClientSession>            │
//! │               ▲                                      │
//! │               │ every owner must exist here          │
//! │               │                                      │
//! │  owners:  IpAddr ──► ClientId   (last claim wins)    │
//! │                                                      │
//! │  next_id: ClientId              (never reused)       │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Both maps live behind ONE lock; never split them, the router relies
//!   on `lookup` seeing a consistent pair
//! - Critical sections are map operations only: no I/O, no awaits, no
//!   logging while the lock is held
//! - A claim for an id that was just removed is an expected race and
//!   returns `ClientNotFound`, it must never panic
//!
//! ## Last Modified
//! v0.1.0 - Initial registry

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use tunhub_common::types::ClientId;

use crate::error::{Result, ServerError};
use crate::services::session::ClientSession;

// ============================================
// ClientRegistry
// ============================================

#[derive(Default)]
struct RegistryInner {
    next_id: ClientId,
    clients: HashMap<ClientId, Arc<ClientSession>>,
    owners: HashMap<IpAddr, ClientId>,
}

/// Registry of live client sessions and their claimed addresses.
#[derive(Default)]
pub struct ClientRegistry {
    inner: Mutex<RegistryInner>,
}

impl ClientRegistry {
    /// Creates an empty registry. The first session gets id 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the next id, builds the session with it and stores it.
    pub fn register<F>(&self, make: F) -> Arc<ClientSession>
    where
        F: FnOnce(ClientId) -> ClientSession,
    {
        let session = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id = id.next();

            let session = Arc::new(make(id));
            inner.clients.insert(id, Arc::clone(&session));
            session
        };

        info!(
            client_id = %session.id(),
            peer = %session.peer(),
            "Client registered"
        );
        session
    }

    /// Maps `address` to `id`, replacing any previous owner.
    ///
    /// Returns the previous owner when it was a different session.
    ///
    /// # Errors
    /// Returns `ClientNotFound` if `id` is not registered; nothing changes.
    pub fn claim_address(&self, id: ClientId, address: IpAddr) -> Result<Option<ClientId>> {
        let previous = {
            let mut inner = self.inner.lock();
            if !inner.clients.contains_key(&id) {
                return Err(ServerError::ClientNotFound(id));
            }
            inner.owners.insert(address, id)
        };

        Ok(previous.filter(|owner| *owner != id))
    }

    /// Returns the session owning `address`, if any.
    #[must_use]
    pub fn lookup(&self, address: &IpAddr) -> Option<(ClientId, Arc<ClientSession>)> {
        let inner = self.inner.lock();
        let id = *inner.owners.get(address)?;
        inner
            .clients
            .get(&id)
            .map(|session| (id, Arc::clone(session)))
    }

    /// Removes a session and every address pointing at it.
    ///
    /// Returns the session and the number of purged addresses, or `None`
    /// if the id was already gone.
    pub fn remove(&self, id: ClientId) -> Option<(Arc<ClientSession>, usize)> {
        let (session, purged) = {
            let mut inner = self.inner.lock();
            let session = inner.clients.remove(&id)?;
            let before = inner.owners.len();
            inner.owners.retain(|_, owner| *owner != id);
            (session, before - inner.owners.len())
        };

        debug!(client_id = %id, purged, "Client removed from registry");
        Some((session, purged))
    }

    /// Removes and returns every session.
    pub fn drain(&self) -> Vec<Arc<ClientSession>> {
        let mut inner = self.inner.lock();
        inner.owners.clear();
        inner.clients.drain().map(|(_, session)| session).collect()
    }

    /// Returns a registered session by id.
    #[must_use]
    pub fn get(&self, id: ClientId) -> Option<Arc<ClientSession>> {
        self.inner.lock().clients.get(&id).cloned()
    }

    /// Returns the number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().clients.len()
    }

    /// Returns `true` if no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().clients.is_empty()
    }

    /// Returns the number of claimed addresses.
    #[must_use]
    pub fn address_count(&self) -> usize {
        self.inner.lock().owners.len()
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ClientRegistry")
            .field("clients", &inner.clients.len())
            .field("addresses", &inner.owners.len())
            .field("next_id", &inner.next_id)
            .finish()
    }
}

// ============================================
// Tests
// ============================================
