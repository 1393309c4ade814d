//! Process-wide keyed store for capabilities published by plugins.
//!
//! Entries are owned by the plugin that registered them and live only while
//! that plugin is enabled; the lifecycle manager calls
//! [`ServiceRegistry::unregister_all`] whenever a plugin leaves `enabled`.
//! Mutations serialise on a write lock. Lookups take a read lock and never
//! observe a half-written entry. Lazy factories run outside the lock.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use trellis_config::{Config, OverridePolicy};

use crate::error::PluginError;

/// Opaque capability handle stored in the registry.
pub type ServiceValue = Arc<dyn Any + Send + Sync>;

pub(crate) type Factory = Box<dyn Fn() -> ServiceValue + Send + Sync>;

/// Receives notice that an override displaced a live entry.
pub trait DisplacementListener: Send + Sync {
    /// Called after `new_owner` replaced `previous_owner`'s entry for `key`.
    fn displaced(&self, key: &str, previous_owner: &str, new_owner: &str);
}

/// Host policy for explicit overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverrideRules {
    /// Whether overrides are honoured at all.
    pub allow_override: bool,
    /// How an honoured override treats the current entry.
    pub policy: OverridePolicy,
}

impl OverrideRules {
    /// Reads the rules from host configuration.
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self {
            allow_override: config.allow_override,
            policy: config.override_policy,
        }
    }
}

enum Slot {
    Ready(ServiceValue),
    Lazy {
        factory: Factory,
        value: OnceLock<ServiceValue>,
    },
}

impl Slot {
    fn resolve(&self) -> ServiceValue {
        match self {
            Self::Ready(value) => Arc::clone(value),
            Self::Lazy { factory, value } => Arc::clone(value.get_or_init(|| factory())),
        }
    }
}

struct Entry {
    owner: String,
    slot: Arc<Slot>,
    relinquished: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Exclusive,
    Override,
}

/// Keyed service store shared by every plugin context.
pub struct ServiceRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    rules: OverrideRules,
    listener: OnceLock<Arc<dyn DisplacementListener>>,
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("keys", &self.keys())
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new(OverrideRules::default())
    }
}

impl ServiceRegistry {
    /// Creates an empty registry applying `rules` to overrides.
    #[must_use]
    pub fn new(rules: OverrideRules) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            rules,
            listener: OnceLock::new(),
        }
    }

    /// Returns the override rules in force.
    #[must_use]
    pub const fn rules(&self) -> OverrideRules {
        self.rules
    }

    /// Installs the listener told about displaced entries.
    ///
    /// Returns `false` when a listener was already installed.
    #[must_use]
    pub fn set_displacement_listener(&self, listener: Arc<dyn DisplacementListener>) -> bool {
        self.listener.set(listener).is_ok()
    }

    /// Publishes `value` under `key` on behalf of `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Conflict`] when a live entry holds `key`,
    /// whoever owns it.
    pub fn register(&self, key: &str, value: ServiceValue, owner: &str) -> Result<(), PluginError> {
        self.insert(key, Slot::Ready(value), owner, Mode::Exclusive, None)
            .map(|_| ())
    }

    /// Publishes a service created by `factory` on first lookup.
    ///
    /// # Errors
    ///
    /// As [`ServiceRegistry::register`].
    pub fn register_factory<F>(&self, key: &str, owner: &str, factory: F) -> Result<(), PluginError>
    where
        F: Fn() -> ServiceValue + Send + Sync + 'static,
    {
        self.insert(key, lazy(factory), owner, Mode::Exclusive, None)
            .map(|_| ())
    }

    /// Publishes `value` under `key`, replacing a live entry if the override
    /// rules permit it.
    ///
    /// Returns the displaced owner, which has been notified through the
    /// displacement listener. Replacing one's own entry displaces nobody.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Conflict`] when overrides are disallowed, or
    /// when the policy requires relinquishment and the current owner has not
    /// relinquished the key.
    pub fn register_override(
        &self,
        key: &str,
        value: ServiceValue,
        owner: &str,
    ) -> Result<Option<String>, PluginError> {
        self.insert(key, Slot::Ready(value), owner, Mode::Override, None)
    }

    pub(crate) fn insert_guarded(
        &self,
        key: &str,
        slot: SlotInit,
        owner: &str,
        override_requested: bool,
        revoked: &AtomicBool,
    ) -> Result<Option<String>, PluginError> {
        let mode = if override_requested {
            Mode::Override
        } else {
            Mode::Exclusive
        };
        let built = match slot {
            SlotInit::Ready(value) => Slot::Ready(value),
            SlotInit::Lazy(factory) => Slot::Lazy {
                factory,
                value: OnceLock::new(),
            },
        };
        self.insert(key, built, owner, mode, Some(revoked))
    }

    fn insert(
        &self,
        key: &str,
        slot: Slot,
        owner: &str,
        mode: Mode,
        revoked: Option<&AtomicBool>,
    ) -> Result<Option<String>, PluginError> {
        let displaced = {
            let mut entries = self.write();
            if revoked.is_some_and(|flag| flag.load(Ordering::Acquire)) {
                return Err(PluginError::ContextRevoked {
                    id: owner.to_owned(),
                });
            }
            let displaced = match entries.get(key) {
                None => None,
                Some(current) => self.check_override(key, current, owner, mode)?,
            };
            entries.insert(
                key.to_owned(),
                Entry {
                    owner: owner.to_owned(),
                    slot: Arc::new(slot),
                    relinquished: false,
                },
            );
            displaced
        };

        tracing::debug!(
            target: "trellis::services",
            event = "service_registered",
            key,
            owner,
            displaced = displaced.as_deref(),
            "service registered"
        );
        if let Some(previous) = displaced.as_deref() {
            if let Some(listener) = self.listener.get() {
                listener.displaced(key, previous, owner);
            }
        }
        Ok(displaced)
    }

    fn check_override(
        &self,
        key: &str,
        current: &Entry,
        owner: &str,
        mode: Mode,
    ) -> Result<Option<String>, PluginError> {
        let conflict = || PluginError::Conflict {
            key: key.to_owned(),
            owner: current.owner.clone(),
        };
        if mode == Mode::Exclusive {
            return Err(conflict());
        }
        if current.owner == owner {
            return Ok(None);
        }
        if !self.rules.allow_override {
            return Err(conflict());
        }
        match self.rules.policy {
            OverridePolicy::Replace => Ok(Some(current.owner.clone())),
            OverridePolicy::RequireRelinquish if current.relinquished => {
                Ok(Some(current.owner.clone()))
            }
            OverridePolicy::RequireRelinquish => Err(conflict()),
        }
    }

    /// Marks `owner`'s entry for `key` as open to override. The entry stays
    /// live until replaced or unregistered.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotFound`] when no entry exists and
    /// [`PluginError::Conflict`] when another plugin owns it.
    pub fn relinquish(&self, key: &str, owner: &str) -> Result<(), PluginError> {
        let mut entries = self.write();
        let entry = entries.get_mut(key).ok_or_else(|| PluginError::NotFound {
            key: key.to_owned(),
        })?;
        if entry.owner != owner {
            return Err(PluginError::Conflict {
                key: key.to_owned(),
                owner: entry.owner.clone(),
            });
        }
        entry.relinquished = true;
        Ok(())
    }

    /// Returns the value under `key`, running a lazy factory on first use.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotFound`] when no live entry exists.
    pub fn lookup(&self, key: &str) -> Result<ServiceValue, PluginError> {
        let slot = self
            .read()
            .get(key)
            .map(|entry| Arc::clone(&entry.slot))
            .ok_or_else(|| PluginError::NotFound {
                key: key.to_owned(),
            })?;
        Ok(slot.resolve())
    }

    /// Returns the value under `key` downcast to `T`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotFound`] when no live entry exists and
    /// [`PluginError::ServiceTypeMismatch`] when it holds another type.
    pub fn lookup_as<T>(&self, key: &str) -> Result<Arc<T>, PluginError>
    where
        T: Any + Send + Sync,
    {
        self.lookup(key)?
            .downcast::<T>()
            .map_err(|_| PluginError::ServiceTypeMismatch {
                key: key.to_owned(),
                expected: type_name::<T>(),
            })
    }

    /// Returns the owner of the live entry under `key`.
    #[must_use]
    pub fn owner_of(&self, key: &str) -> Option<String> {
        self.read().get(key).map(|entry| entry.owner.clone())
    }

    /// Returns `true` when a live entry exists under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Removes `owner`'s entry under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotFound`] when no entry exists and
    /// [`PluginError::Conflict`] when another plugin owns it.
    pub fn unregister(&self, key: &str, owner: &str) -> Result<(), PluginError> {
        let mut entries = self.write();
        let current = entries
            .get(key)
            .map(|entry| entry.owner.clone())
            .ok_or_else(|| PluginError::NotFound {
                key: key.to_owned(),
            })?;
        if current != owner {
            return Err(PluginError::Conflict {
                key: key.to_owned(),
                owner: current,
            });
        }
        entries.remove(key);
        Ok(())
    }

    /// Removes every entry owned by `owner`, returning the removed keys in
    /// lexical order.
    pub fn unregister_all(&self, owner: &str) -> Vec<String> {
        let mut removed = Vec::new();
        self.write().retain(|key, entry| {
            let keep = entry.owner != owner;
            if !keep {
                removed.push(key.clone());
            }
            keep
        });
        removed.sort();
        if !removed.is_empty() {
            tracing::debug!(
                target: "trellis::services",
                event = "services_unregistered",
                owner,
                keys = ?removed,
                "services unregistered"
            );
        }
        removed
    }

    /// Returns the live keys in lexical order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the keys owned by `owner` in lexical order.
    #[must_use]
    pub fn keys_of(&self, owner: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .read()
            .iter()
            .filter(|(_, entry)| entry.owner == owner)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Returns the number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` when no entries are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Value handed to [`ServiceRegistry::insert_guarded`].
pub(crate) enum SlotInit {
    Ready(ServiceValue),
    Lazy(Factory),
}

fn lazy<F>(factory: F) -> Slot
where
    F: Fn() -> ServiceValue + Send + Sync + 'static,
{
    Slot::Lazy {
        factory: Box::new(factory),
        value: OnceLock::new(),
    }
}
