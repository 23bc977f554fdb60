//! Services: named groupings of resources under a provider

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Value, json};

use super::resource::{Resource, ResourceBuilder};
use super::{Lifecycle, ResourcePath};
use crate::notify::{EntityKind, GatewayMessage, Notifier};
use crate::{Error, Result};

/// A live service node owning its resources
pub struct Service {
    name: String,
    path: ResourcePath,
    state: RwLock<Lifecycle>,
    resources: RwLock<Vec<Arc<Resource>>>,
    notifier: Notifier,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Service {
    pub(crate) fn new(
        provider_path: &ResourcePath,
        name: impl Into<String>,
        notifier: Notifier,
    ) -> Result<Arc<Self>> {
        let name = name.into();
        let path = provider_path.join(&name)?;
        Ok(Arc::new(Self {
            name,
            path,
            state: RwLock::new(Lifecycle::Created),
            resources: RwLock::new(Vec::new()),
            notifier,
        }))
    }

    /// Service name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full path of the service
    #[must_use]
    pub const fn path(&self) -> &ResourcePath {
        &self.path
    }

    /// Current lifecycle state
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a resource built from `builder`.
    ///
    /// The resource starts immediately when the service is already started.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyRegistered`] when a resource of that name exists.
    pub fn add_resource(&self, builder: ResourceBuilder) -> Result<Arc<Resource>> {
        let resource = builder.build(&self.path, self.notifier.clone())?;
        {
            let mut resources = self
                .resources
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if resources.iter().any(|r| r.name() == resource.name()) {
                return Err(Error::AlreadyRegistered(resource.path().to_string()));
            }
            resources.push(Arc::clone(&resource));
        }
        if self.lifecycle() == Lifecycle::Started {
            resource.start();
        }
        Ok(resource)
    }

    /// Look up a resource by name
    #[must_use]
    pub fn resource(&self, name: &str) -> Option<Arc<Resource>> {
        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.name() == name)
            .cloned()
    }

    /// All resources in insertion order
    #[must_use]
    pub fn resources(&self) -> Vec<Arc<Resource>> {
        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Transition to STARTED, emit appearing, start resources.
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
            entity: EntityKind::Service,
            description: self.describe(),
        });
        for resource in self.resources() {
            resource.start();
        }
    }

    /// Stop resources first, then transition and emit disappearing.
    ///
    /// No-op when not started.
    pub fn stop(&self) {
        if self.lifecycle() != Lifecycle::Started {
            return;
        }
        for resource in self.resources() {
            resource.stop();
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state != Lifecycle::Started {
            return;
        }
        *state = Lifecycle::Stopped;
        self.notifier.send(GatewayMessage::Disappearing {
            path: self.path.to_string(),
            entity: EntityKind::Service,
        });
    }

    /// Sum of resource subscription gauges
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.resources()
            .iter()
            .map(|r| r.subscription_count())
            .sum()
    }

    /// JSON description: name plus resource summaries
    #[must_use]
    pub fn describe(&self) -> Value {
        let resources: Vec<Value> = self
            .resources()
            .iter()
            .map(|r| {
                let mut doc = json!({ "name": r.name(), "type": r.kind() });
                if let Some(rws) = r.rws() {
                    doc["rws"] = json!(rws);
                }
                doc
            })
            .collect();
        json!({
            "name": self.name,
            "resources": resources,
            "subscriptions": self.subscription_count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResourceKind, ValueType, WriteOrigin};

    fn service() -> Arc<Service> {
        let root = ResourcePath::provider_root("p1").unwrap();
        Service::new(&root, "s1", Notifier::disabled()).unwrap()
    }

    #[test]
    fn duplicate_resource_is_rejected() {
        let svc = service();
        svc.add_resource(ResourceBuilder::new("temp", ResourceKind::Sensor))
            .unwrap();
        let err = svc
            .add_resource(ResourceBuilder::new("temp", ResourceKind::Sensor))
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyRegistered(_)));
    }

    #[test]
    fn resources_added_after_start_are_started() {
        let svc = service();
        svc.start();
        let res = svc
            .add_resource(
                ResourceBuilder::new("temp", ResourceKind::Sensor).value_type(ValueType::Float),
            )
            .unwrap();
        assert_eq!(res.lifecycle(), Lifecycle::Started);
        res.update(None, serde_json::json!(1.0), WriteOrigin::Driver)
            .unwrap();
    }

    #[test]
    fn stop_cascades_to_resources() {
        let svc = service();
        let res = svc
            .add_resource(ResourceBuilder::new("temp", ResourceKind::Sensor))
            .unwrap();
        svc.start();
        assert_eq!(res.lifecycle(), Lifecycle::Started);
        svc.stop();
        assert_eq!(res.lifecycle(), Lifecycle::Stopped);
        assert_eq!(svc.lifecycle(), Lifecycle::Stopped);
    }
}
