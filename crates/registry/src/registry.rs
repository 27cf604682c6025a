use std::{
    collections::HashMap,
    fmt::Display,
    hash::Hash,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    clock::SharedClock,
    names::{name_key, sanitize},
};

pub const MAX_ENTITIES: usize = 20;

/// Lazy-expiry capability, asked on every registry read.
pub trait Reapable {
    fn should_expire(&self, now: DateTime<Utc>, policy: &ExpiryPolicy) -> bool;
}

pub trait Entity: Reapable + Clone + Send + Sync + 'static {
    fn name(&self) -> &str;
}

/// Activity-based lifetimes, measured from an entity's last activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    pub idle_ttl: Duration,
    pub closed_grace: Duration,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            idle_ttl: Duration::hours(1),
            closed_grace: Duration::minutes(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    pub max_entities: usize,
    /// Store-level lifetime counted from registration, independent of activity.
    pub entry_ttl: Option<Duration>,
    pub expiry: ExpiryPolicy,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            max_entities: MAX_ENTITIES,
            entry_ttl: None,
            expiry: ExpiryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("the name {0} is already taken, choose another")]
    Duplicate(String),
    #[error("no more than {0} entries can exist at once")]
    CapacityExceeded(usize),
    #[error("the name is empty once unsupported characters are removed")]
    InvalidName,
    #[error("{0} is already registered")]
    IdTaken(String),
    #[error("{0} no longer exists")]
    NotFound(String),
}

struct Slot<E> {
    entity: E,
    key: String,
    seq: u64,
    expires_at: Option<DateTime<Utc>>,
}

struct Inner<Id, E> {
    index: HashMap<String, Id>,
    slots: HashMap<Id, Slot<E>>,
    next_seq: u64,
    evicted: Vec<(Id, E)>,
}

/// Name-keyed store of live entities of one kind.
///
/// Every operation takes the kind-wide lock for its whole duration, so index
/// and slot changes are never observed half-done.
pub struct EntityRegistry<Id, E> {
    kind: &'static str,
    inner: Arc<Mutex<Inner<Id, E>>>,
    options: RegistryOptions,
    clock: SharedClock,
}

impl<Id, E> Clone for EntityRegistry<Id, E> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            inner: Arc::clone(&self.inner),
            options: self.options,
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<Id, E> EntityRegistry<Id, E>
where
    Id: Clone + Eq + Hash + Display + Send + 'static,
    E: Entity,
{
    pub fn new(kind: &'static str, options: RegistryOptions, clock: SharedClock) -> Self {
        Self {
            kind,
            inner: Arc::new(Mutex::new(Inner {
                index: HashMap::new(),
                slots: HashMap::new(),
                next_seq: 0,
                evicted: Vec::new(),
            })),
            options,
            clock,
        }
    }

    pub fn available(&self, name: &str) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        self.reap_locked(&mut inner);
        self.check_available(&inner, name).map(|_| ())
    }

    /// Whether a live entry already holds this name's key, regardless of capacity.
    pub fn contains_name(&self, name: &str) -> bool {
        let mut inner = self.lock();
        self.reap_locked(&mut inner);
        inner.index.contains_key(&name_key(name))
    }

    /// Checks availability and inserts under one lock; returns the sanitized name.
    pub fn register<F>(&self, name: &str, id: Id, construct: F) -> Result<String, RegistryError>
    where
        F: FnOnce(String) -> E,
    {
        let mut inner = self.lock();
        self.reap_locked(&mut inner);
        if inner.slots.contains_key(&id) {
            return Err(RegistryError::IdTaken(id.to_string()));
        }
        let key = self.check_available(&inner, name)?;

        let sanitized = sanitize(name);
        let entity = construct(sanitized.clone());
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.index.insert(key.clone(), id.clone());
        inner.slots.insert(
            id.clone(),
            Slot {
                entity,
                key,
                seq,
                expires_at: self
                    .options
                    .entry_ttl
                    .and_then(|ttl| self.clock.now().checked_add_signed(ttl)),
            },
        );
        info!(kind = self.kind, %id, name = %sanitized, "registered");
        Ok(sanitized)
    }

    pub fn find(&self, id: &Id) -> Option<E> {
        let mut inner = self.lock();
        self.reap_locked(&mut inner);
        inner.slots.get(id).map(|slot| slot.entity.clone())
    }

    /// Unconditional overwrite of a live entry. The name key is not revisited,
    /// so `entity` must carry the same name.
    pub fn replace(&self, id: &Id, entity: E) -> Result<(), RegistryError> {
        let mut inner = self.lock();
        self.reap_locked(&mut inner);
        let slot = inner
            .slots
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        slot.entity = entity;
        Ok(())
    }

    /// Read-modify-write under the registry lock.
    pub fn modify<R, F>(&self, id: &Id, apply: F) -> Result<R, RegistryError>
    where
        F: FnOnce(&mut E) -> R,
    {
        let mut inner = self.lock();
        self.reap_locked(&mut inner);
        let slot = inner
            .slots
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        Ok(apply(&mut slot.entity))
    }

    /// Live `(id, name)` pairs in registration order.
    pub fn list(&self) -> Vec<(Id, String)> {
        let mut inner = self.lock();
        self.reap_locked(&mut inner);
        let mut live: Vec<_> = inner
            .slots
            .iter()
            .map(|(id, slot)| (slot.seq, id.clone(), slot.entity.name().to_string()))
            .collect();
        live.sort_by_key(|(seq, _, _)| *seq);
        live.into_iter().map(|(_, id, name)| (id, name)).collect()
    }

    /// Removes the entry and its name key, handing the entity back for cascading.
    pub fn delete(&self, id: &Id) -> Option<E> {
        let mut inner = self.lock();
        let slot = inner.slots.remove(id)?;
        if inner.index.get(&slot.key) == Some(id) {
            inner.index.remove(&slot.key);
        }
        info!(kind = self.kind, %id, "deleted");
        Some(slot.entity)
    }

    /// Drops every expired entry; returns how many went.
    pub fn reap(&self) -> usize {
        let mut inner = self.lock();
        self.reap_locked(&mut inner)
    }

    /// Entities removed by reaping since the last call.
    pub fn take_evicted(&self) -> Vec<(Id, E)> {
        std::mem::take(&mut self.lock().evicted)
    }

    fn check_available(&self, inner: &Inner<Id, E>, name: &str) -> Result<String, RegistryError> {
        let key = name_key(name);
        if key.is_empty() {
            return Err(RegistryError::InvalidName);
        }
        if inner.slots.len() >= self.options.max_entities {
            return Err(RegistryError::CapacityExceeded(self.options.max_entities));
        }
        if inner.index.contains_key(&key) {
            return Err(RegistryError::Duplicate(sanitize(name)));
        }
        Ok(key)
    }

    fn reap_locked(&self, inner: &mut Inner<Id, E>) -> usize {
        let now = self.clock.now();
        let policy = self.options.expiry;
        let expired: Vec<(String, Id)> = inner
            .index
            .iter()
            .filter(|(_, id)| match inner.slots.get(*id) {
                None => true,
                Some(slot) => {
                    slot.expires_at.is_some_and(|at| at <= now)
                        || slot.entity.should_expire(now, &policy)
                }
            })
            .map(|(key, id)| (key.clone(), id.clone()))
            .collect();

        for (key, id) in &expired {
            inner.index.remove(key);
            if let Some(slot) = inner.slots.remove(id) {
                info!(kind = self.kind, %id, "reaped expired entry");
                inner.evicted.push((id.clone(), slot.entity));
            } else {
                debug!(kind = self.kind, %id, "dropped dangling index entry");
            }
        }
        expired.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<Id, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
