//! Resources: typed leaves of the service tree carrying attributes
//!
//! A resource's kind fixes the set of access methods it answers to; the
//! method table is derived once at construction rather than dispatched
//! dynamically.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::attribute::{Attribute, UpdateOutcome, ValuePolicy, WriteOrigin};
use super::value::{TypedValue, ValueType};
use super::{DEFAULT_ATTRIBUTE, Lifecycle, ResourcePath};
use crate::access::{AccessLevel, AccessMethod};
use crate::notify::{EntityKind, GatewayMessage, Notifier};
use crate::{Error, Result};

/// Handler executed by ACT on an action resource
pub type ActHandler = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Tagged resource kinds, each with a fixed capability set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    /// Caller-writable configuration value
    Property,
    /// Driver-fed measurement
    Sensor,
    /// Driver- or trigger-owned state
    StateVariable,
    /// Executable action with no value slot
    Action,
    /// Caller-writable location value
    Location,
}

impl ResourceKind {
    /// Methods this kind answers to
    #[must_use]
    pub const fn supported_methods(self) -> &'static [AccessMethod] {
        match self {
            Self::Property | Self::Location => &[
                AccessMethod::Get,
                AccessMethod::Set,
                AccessMethod::Subscribe,
                AccessMethod::Unsubscribe,
                AccessMethod::Describe,
            ],
            Self::Sensor | Self::StateVariable => &[
                AccessMethod::Get,
                AccessMethod::Subscribe,
                AccessMethod::Unsubscribe,
                AccessMethod::Describe,
            ],
            Self::Action => &[AccessMethod::Act, AccessMethod::Describe],
        }
    }

    /// Whether the kind carries a value slot
    #[must_use]
    pub const fn is_value_bearing(self) -> bool {
        !matches!(self, Self::Action)
    }

    /// Default policy of the seeded `value` attribute
    const fn default_policy(self) -> ValuePolicy {
        match self {
            Self::Property | Self::Location => ValuePolicy::Modifiable,
            Self::Sensor | Self::StateVariable | Self::Action => ValuePolicy::Updatable,
        }
    }
}

/// Construction-time description of a resource
pub struct ResourceBuilder {
    name: String,
    kind: ResourceKind,
    value_type: ValueType,
    attributes: Vec<Attribute>,
    default_attribute: String,
    act_handler: Option<ActHandler>,
}

impl ResourceBuilder {
    /// Start a builder for a resource of the given kind
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            value_type: ValueType::Json,
            attributes: Vec::new(),
            default_attribute: DEFAULT_ATTRIBUTE.to_string(),
            act_handler: None,
        }
    }

    /// Declare the type of the seeded default attribute
    #[must_use]
    pub const fn value_type(mut self, ty: ValueType) -> Self {
        self.value_type = ty;
        self
    }

    /// Attach an explicit attribute
    #[must_use]
    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Override which attribute GET/SET resolve to when unnamed
    #[must_use]
    pub fn default_attribute(mut self, name: impl Into<String>) -> Self {
        self.default_attribute = name.into();
        self
    }

    /// Attach the handler executed by ACT
    #[must_use]
    pub fn act_handler(
        mut self,
        handler: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.act_handler = Some(Arc::new(handler));
        self
    }

    /// Materialize the resource under `parent`.
    ///
    /// Value-bearing kinds that declare no attribute named as the default get
    /// one seeded with the kind's default policy.
    pub(crate) fn build(mut self, parent: &ResourcePath, notifier: Notifier) -> Result<Arc<Resource>> {
        let path = parent.join(&self.name)?;
        if self.kind.is_value_bearing()
            && !self
                .attributes
                .iter()
                .any(|a| a.name() == self.default_attribute)
        {
            self.attributes.push(Attribute::new(
                self.default_attribute.clone(),
                self.value_type,
                self.kind.default_policy(),
            ));
        }
        Ok(Arc::new(Resource {
            name: self.name,
            path,
            kind: self.kind,
            state: RwLock::new(Lifecycle::Created),
            attributes: RwLock::new(self.attributes),
            default_attribute: self.default_attribute,
            act_handler: self.act_handler,
            links: RwLock::new(Vec::new()),
            subscriptions: AtomicUsize::new(0),
            views: RwLock::new(HashMap::new()),
            notifier,
        }))
    }
}

/// A live resource node
pub struct Resource {
    name: String,
    path: ResourcePath,
    kind: ResourceKind,
    state: RwLock<Lifecycle>,
    attributes: RwLock<Vec<Attribute>>,
    default_attribute: String,
    act_handler: Option<ActHandler>,
    /// Resources mirroring this one's value
    links: RwLock<Vec<Weak<Resource>>>,
    /// Observability-only gauge of active subscriptions
    subscriptions: AtomicUsize,
    /// Cached proxy method sets, one per resolved access level
    views: RwLock<HashMap<AccessLevel, Arc<HashSet<AccessMethod>>>>,
    notifier: Notifier,
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("path", &self.path)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Resource {
    /// Resource name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full path of the resource
    #[must_use]
    pub const fn path(&self) -> &ResourcePath {
        &self.path
    }

    /// Resource kind
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Current lifecycle state
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Name of the attribute unnamed GET/SET resolve to
    #[must_use]
    pub fn default_attribute(&self) -> &str {
        &self.default_attribute
    }

    /// Whether this kind answers to `method`
    #[must_use]
    pub fn supports(&self, method: AccessMethod) -> bool {
        self.kind.supported_methods().contains(&method)
    }

    /// Transition CREATED/STOPPED to STARTED and emit an appearing message.
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
            entity: EntityKind::Resource,
            description: self.describe(),
        });
    }

    /// Transition STARTED to STOPPED, clear cached views, emit disappearing.
    ///
    /// No-op when not started.
    pub fn stop(&self) {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if *state != Lifecycle::Started {
                return;
            }
            *state = Lifecycle::Stopped;
        }
        self.views
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.notifier.send(GatewayMessage::Disappearing {
            path: self.path.to_string(),
            entity: EntityKind::Resource,
        });
    }

    /// Write an attribute value.
    ///
    /// Resolves to the default attribute when `attribute` is `None`. On a
    /// successful write the update message is emitted (unless the attribute
    /// is hidden or the resource is not started) and the new value is
    /// mirrored to linked resources.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for unknown attributes, plus the write errors of
    /// [`Attribute::write`].
    pub fn update(
        &self,
        attribute: Option<&str>,
        raw: Value,
        origin: WriteOrigin,
    ) -> Result<UpdateOutcome> {
        let name = attribute.unwrap_or(&self.default_attribute);
        let timestamp = Utc::now();
        let started = self.lifecycle() == Lifecycle::Started;
        let outcome = {
            let mut attrs = self
                .attributes
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let attr = attrs
                .iter_mut()
                .find(|a| a.name() == name)
                .ok_or_else(|| Error::NotFound(format!("{}/{name}", self.path)))?;
            let hidden = attr.is_hidden();
            let outcome = attr.write(raw, timestamp, origin)?;
            // Emit under the attribute lock so concurrent writers observe
            // value changes and their notifications in the same order.
            if !hidden && started {
                self.notifier.send(GatewayMessage::ValueUpdated {
                    path: format!("{}/{name}", self.path),
                    old: outcome.old.to_json(),
                    new: outcome.new.to_json(),
                    timestamp: outcome.timestamp,
                    has_changed: outcome.has_changed,
                    description: attr.describe(),
                });
            }
            outcome
        };
        if origin != WriteOrigin::Mirror {
            self.propagate_to_links(&outcome);
        }
        Ok(outcome)
    }

    /// Read an attribute value and its last-change timestamp.
    ///
    /// Hidden attributes are not readable through this path.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for unknown or hidden attributes.
    pub fn value(&self, attribute: Option<&str>) -> Result<(TypedValue, DateTime<Utc>)> {
        let name = attribute.unwrap_or(&self.default_attribute);
        let attrs = self
            .attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        attrs
            .iter()
            .find(|a| a.name() == name && !a.is_hidden())
            .map(|a| (a.value().clone(), a.timestamp()))
            .ok_or_else(|| Error::NotFound(format!("{}/{name}", self.path)))
    }

    /// Execute the action handler with the given parameters.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownMethod`] when the resource is not an executable
    /// action; otherwise whatever the handler returns.
    pub fn act(&self, parameters: &[Value]) -> Result<Value> {
        match (self.kind, &self.act_handler) {
            (ResourceKind::Action, Some(handler)) => handler(parameters),
            _ => Err(Error::UnknownMethod {
                method: AccessMethod::Act.to_string(),
                uri: self.path.to_string(),
            }),
        }
    }

    /// Lock or unlock an attribute when a trigger takes or releases
    /// ownership of its value.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for unknown attributes.
    pub fn set_attribute_locked(&self, attribute: Option<&str>, locked: bool) -> Result<()> {
        let name = attribute.unwrap_or(&self.default_attribute);
        let mut attrs = self
            .attributes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let attr = attrs
            .iter_mut()
            .find(|a| a.name() == name)
            .ok_or_else(|| Error::NotFound(format!("{}/{name}", self.path)))?;
        attr.set_locked(locked);
        Ok(())
    }

    /// Register `mirror` to receive every value written to this resource
    pub fn link(&self, mirror: &Arc<Self>) {
        self.links
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(mirror));
    }

    fn propagate_to_links(&self, outcome: &UpdateOutcome) {
        let links = self.links.read().unwrap_or_else(PoisonError::into_inner);
        for link in links.iter().filter_map(Weak::upgrade) {
            if let Err(e) = link.update(None, outcome.new.to_json(), WriteOrigin::Mirror) {
                tracing::warn!(
                    source = %self.path,
                    target = %link.path(),
                    error = %e,
                    "linked resource rejected mirrored value"
                );
            }
        }
    }

    /// Read/write capability of the default attribute (`"RW"` or `"RO"`)
    #[must_use]
    pub fn rws(&self) -> Option<&'static str> {
        if !self.kind.is_value_bearing() {
            return None;
        }
        let attrs = self
            .attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let writable = attrs
            .iter()
            .find(|a| a.name() == self.default_attribute)
            .is_some_and(|a| a.policy() == ValuePolicy::Modifiable);
        Some(if writable { "RW" } else { "RO" })
    }

    /// JSON description: kind, capability and non-hidden attributes
    #[must_use]
    pub fn describe(&self) -> Value {
        let attrs = self
            .attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let described: Vec<Value> = attrs
            .iter()
            .filter(|a| !a.is_hidden())
            .map(Attribute::describe)
            .collect();
        let mut doc = json!({
            "name": self.name,
            "type": self.kind,
            "attributes": described,
            "subscriptions": self.subscription_count(),
        });
        if let Some(rws) = self.rws() {
            doc["rws"] = json!(rws);
        }
        doc
    }

    /// Increment the subscription gauge
    pub fn inc_subscriptions(&self) {
        self.subscriptions.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement the subscription gauge
    pub fn dec_subscriptions(&self) {
        let _ = self
            .subscriptions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                n.checked_sub(1)
            });
    }

    /// Number of active subscriptions on this resource
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::Relaxed)
    }

    /// Cached proxy method set for a resolved access level
    #[must_use]
    pub fn cached_view(&self, level: AccessLevel) -> Option<Arc<HashSet<AccessMethod>>> {
        self.views
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&level)
            .cloned()
    }

    /// Store the proxy method set for a resolved access level
    pub fn store_view(&self, level: AccessLevel, methods: Arc<HashSet<AccessMethod>>) {
        self.views
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(level, methods);
    }
}
