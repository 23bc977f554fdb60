//! Providers: root entities of the device model
//!
//! Every provider is seeded with the mandatory administration service
//! carrying `friendlyName`, `location` and `icon`.

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Value, json};

use super::resource::{ResourceBuilder, ResourceKind};
use super::service::Service;
use super::{ADMIN_SERVICE, Lifecycle, ResourcePath};
use crate::notify::{EntityKind, GatewayMessage, Notifier};
use crate::{Error, Result};

/// A live provider node owning its services
pub struct Provider {
    name: String,
    path: ResourcePath,
    state: RwLock<Lifecycle>,
    services: RwLock<Vec<Arc<Service>>>,
    notifier: Notifier,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Provider {
    /// Create a provider with its administration service seeded.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPath`] when the name is not a valid path segment.
    pub fn new(name: impl Into<String>, notifier: Notifier) -> Result<Arc<Self>> {
        let name = name.into();
        let path = ResourcePath::provider_root(&name)?;
        let provider = Arc::new(Self {
            name,
            path,
            state: RwLock::new(Lifecycle::Created),
            services: RwLock::new(Vec::new()),
            notifier,
        });
        let admin = provider.add_service(ADMIN_SERVICE)?;
        admin.add_resource(
            ResourceBuilder::new("friendlyName", ResourceKind::Property)
                .value_type(super::ValueType::String),
        )?;
        admin.add_resource(
            ResourceBuilder::new("location", ResourceKind::Location)
                .value_type(super::ValueType::Json),
        )?;
        admin.add_resource(
            ResourceBuilder::new("icon", ResourceKind::Property)
                .value_type(super::ValueType::String),
        )?;
        Ok(provider)
    }

    /// Provider name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Root path of the provider
    #[must_use]
    pub const fn path(&self) -> &ResourcePath {
        &self.path
    }

    /// Current lifecycle state
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a new service.
    ///
    /// The service starts immediately when the provider is already started.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyRegistered`] when a service of that name exists.
    pub fn add_service(&self, name: impl Into<String>) -> Result<Arc<Service>> {
        let service = Service::new(&self.path, name, self.notifier.clone())?;
        {
            let mut services = self
                .services
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if services.iter().any(|s| s.name() == service.name()) {
                return Err(Error::AlreadyRegistered(service.path().to_string()));
            }
            services.push(Arc::clone(&service));
        }
        if self.lifecycle() == Lifecycle::Started {
            service.start();
        }
        Ok(service)
    }

    /// Look up a service by name
    #[must_use]
    pub fn service(&self, name: &str) -> Option<Arc<Service>> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|s| s.name() == name)
            .cloned()
    }

    /// All services in insertion order
    #[must_use]
    pub fn services(&self) -> Vec<Arc<Service>> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Transition to STARTED, emit appearing, start services.
    ///
    /// No-op when already started.
    pub fn start(&self) {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if *state == Lifecycle::Started {
                return;
            }
            *state = Lifecycle::Started;
        }
        self.notifier.send(GatewayMessage::Appearing {
            path: self.path.to_string(),
            entity: EntityKind::Provider,
            description: self.describe(),
        });
        for service in self.services() {
            service.start();
        }
    }

    /// Stop services first, then transition and emit disappearing.
    ///
    /// No-op when not started.
    pub fn stop(&self) {
        if self.lifecycle() != Lifecycle::Started {
            return;
        }
        for service in self.services() {
            service.stop();
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state != Lifecycle::Started {
            return;
        }
        *state = Lifecycle::Stopped;
        self.notifier.send(GatewayMessage::Disappearing {
            path: self.path.to_string(),
            entity: EntityKind::Provider,
        });
    }

    /// JSON description: name plus service summaries
    #[must_use]
    pub fn describe(&self) -> Value {
        let services: Vec<Value> = self
            .services()
            .iter()
            .map(|s| json!({ "name": s.name() }))
            .collect();
        json!({
            "name": self.name,
            "services": services,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_seeds_admin_service() {
        let provider = Provider::new("p1", Notifier::disabled()).unwrap();
        let admin = provider.service(ADMIN_SERVICE).unwrap();
        assert!(admin.resource("friendlyName").is_some());
        assert!(admin.resource("location").is_some());
        assert!(admin.resource("icon").is_some());
    }

    #[test]
    fn start_cascades_and_is_idempotent() {
        let provider = Provider::new("p1", Notifier::disabled()).unwrap();
        let svc = provider.add_service("s1").unwrap();
        provider.start();
        assert_eq!(svc.lifecycle(), Lifecycle::Started);
        provider.start();
        assert_eq!(provider.lifecycle(), Lifecycle::Started);
    }

    #[test]
    fn services_added_after_start_are_started() {
        let provider = Provider::new("p1", Notifier::disabled()).unwrap();
        provider.start();
        let svc = provider.add_service("late").unwrap();
        assert_eq!(svc.lifecycle(), Lifecycle::Started);
    }

    #[test]
    fn invalid_provider_name_is_rejected() {
        assert!(Provider::new("a/b", Notifier::disabled()).is_err());
        assert!(Provider::new("", Notifier::disabled()).is_err());
    }
}
