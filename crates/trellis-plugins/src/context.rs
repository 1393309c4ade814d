//! Capabilities handed to a plugin's hooks.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::PluginError;
use crate::extensions::{Extension, ExtensionRegistry};
use crate::services::{ServiceRegistry, ServiceValue, SlotInit};

/// A plugin's view of the registries, scoped to its own identity.
///
/// Everything registered through the context is owned by the plugin and is
/// withdrawn when it leaves `enabled`. A context whose hook was abandoned
/// after a timeout is revoked and refuses further registrations.
#[derive(Debug, Clone)]
pub struct PluginContext {
    plugin_id: String,
    services: Arc<ServiceRegistry>,
    extensions: Arc<ExtensionRegistry>,
    revoked: Arc<AtomicBool>,
}

impl PluginContext {
    /// Creates a context for `plugin_id`.
    #[must_use]
    pub fn new(
        plugin_id: impl Into<String>,
        services: Arc<ServiceRegistry>,
        extensions: Arc<ExtensionRegistry>,
    ) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            services,
            extensions,
            revoked: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the id of the plugin the context belongs to.
    #[must_use]
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Returns `true` once the context has been revoked.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::Acquire)
    }

    pub(crate) fn revoke(&self) {
        self.revoked.store(true, Ordering::Release);
    }

    /// Publishes `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Conflict`] when the key is held, or
    /// [`PluginError::ContextRevoked`].
    pub fn register_service<T>(&self, key: &str, value: T) -> Result<(), PluginError>
    where
        T: Any + Send + Sync,
    {
        self.register_shared(key, Arc::new(value))
    }

    /// Publishes an already shared handle under `key`.
    ///
    /// # Errors
    ///
    /// As [`PluginContext::register_service`].
    pub fn register_shared(&self, key: &str, value: ServiceValue) -> Result<(), PluginError> {
        self.services
            .insert_guarded(key, SlotInit::Ready(value), &self.plugin_id, false, &self.revoked)
            .map(|_| ())
    }

    /// Publishes a service built by `factory` on its first lookup.
    ///
    /// # Errors
    ///
    /// As [`PluginContext::register_service`].
    pub fn register_factory<F, T>(&self, key: &str, factory: F) -> Result<(), PluginError>
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: Any + Send + Sync,
    {
        let init = SlotInit::Lazy(Box::new(move || Arc::new(factory()) as ServiceValue));
        self.services
            .insert_guarded(key, init, &self.plugin_id, false, &self.revoked)
            .map(|_| ())
    }

    /// Publishes `value` under `key`, overriding a live entry when the host
    /// allows it. Returns the displaced owner.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Conflict`] when the override is refused, or
    /// [`PluginError::ContextRevoked`].
    pub fn override_service<T>(&self, key: &str, value: T) -> Result<Option<String>, PluginError>
    where
        T: Any + Send + Sync,
    {
        self.services.insert_guarded(
            key,
            SlotInit::Ready(Arc::new(value)),
            &self.plugin_id,
            true,
            &self.revoked,
        )
    }

    /// Opens this plugin's entry under `key` to override.
    ///
    /// # Errors
    ///
    /// See [`ServiceRegistry::relinquish`].
    pub fn relinquish_service(&self, key: &str) -> Result<(), PluginError> {
        self.services.relinquish(key, &self.plugin_id)
    }

    /// Withdraws this plugin's entry under `key`.
    ///
    /// # Errors
    ///
    /// See [`ServiceRegistry::unregister`].
    pub fn unregister_service(&self, key: &str) -> Result<(), PluginError> {
        self.services.unregister(key, &self.plugin_id)
    }

    /// Looks up a service.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotFound`] when no live entry exists.
    pub fn service(&self, key: &str) -> Result<ServiceValue, PluginError> {
        self.services.lookup(key)
    }

    /// Looks up a service of a known type.
    ///
    /// # Errors
    ///
    /// See [`ServiceRegistry::lookup_as`].
    pub fn service_as<T>(&self, key: &str) -> Result<Arc<T>, PluginError>
    where
        T: Any + Send + Sync,
    {
        self.services.lookup_as(key)
    }

    /// Declares an extension point owned by this plugin.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::DuplicateExtensionPoint`] or
    /// [`PluginError::ContextRevoked`].
    pub fn declare_extension_point(&self, point: &str) -> Result<(), PluginError> {
        self.extensions
            .declare_guarded(point, &self.plugin_id, Some(&self.revoked))
    }

    /// Contributes a lazily evaluated extension to `point`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownExtensionPoint`] or
    /// [`PluginError::ContextRevoked`].
    pub fn extend<F, T>(&self, point: &str, extender: F) -> Result<(), PluginError>
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: Any + Send + Sync,
    {
        self.extensions.contribute_guarded(
            point,
            &self.plugin_id,
            Box::new(move || Arc::new(extender()) as Extension),
            Some(&self.revoked),
        )
    }

    /// Returns every extension contributed to `point`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownExtensionPoint`].
    pub fn extensions(&self, point: &str) -> Result<Vec<Extension>, PluginError> {
        self.extensions.extensions(point)
    }

    /// Returns the extensions of `point` that are of type `T`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownExtensionPoint`].
    pub fn extensions_of<T>(&self, point: &str) -> Result<Vec<Arc<T>>, PluginError>
    where
        T: Any + Send + Sync,
    {
        self.extensions.extensions_of(point)
    }
}
