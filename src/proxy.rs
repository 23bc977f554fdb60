//! Access-filtered proxy views over entity nodes
//!
//! A view is a caller-scoped, read/invoke-restricted façade over one
//! resource. Views are memoized per (node, resolved access level) in the
//! node itself, so stopping the node clears its cache. Callers whose
//! DESCRIBE level is insufficient get an inaccessible placeholder: a no-op
//! view whose every operation reports not-authorized, never an error leak.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::access::{AccessMethod, AccessProfile, AccessTree};
use crate::model::{Resource, TypedValue, WriteOrigin};
use crate::{Error, Result};

/// Builds access-filtered views, one cache entry per (node, level)
#[derive(Debug, Clone)]
pub struct ProxyFactory {
    tree: Arc<AccessTree>,
}

impl ProxyFactory {
    /// Create a factory resolving against the given tree
    #[must_use]
    pub const fn new(tree: Arc<AccessTree>) -> Self {
        Self { tree }
    }

    /// The access tree the factory resolves against
    #[must_use]
    pub const fn tree(&self) -> &Arc<AccessTree> {
        &self.tree
    }

    /// Build (or fetch from the node's cache) the caller's view of a
    /// resource.
    ///
    /// When the caller's resolved DESCRIBE level is insufficient the
    /// returned view is the inaccessible placeholder; this is never an
    /// error.
    #[must_use]
    pub fn resource_view(&self, resource: &Arc<Resource>, profile: &AccessProfile) -> ResourceView {
        let path = resource.path().as_str();
        if !profile.can(path, AccessMethod::Describe) {
            return ResourceView::inaccessible(Arc::clone(resource));
        }
        let level = profile.level(path);
        let methods = resource.cached_view(level).unwrap_or_else(|| {
            let computed: HashSet<AccessMethod> = resource
                .kind()
                .supported_methods()
                .iter()
                .copied()
                .filter(|m| self.tree.accessible(path, *m, profile.identity()))
                .collect();
            let methods = Arc::new(computed);
            resource.store_view(level, Arc::clone(&methods));
            methods
        });
        ResourceView {
            resource: Arc::clone(resource),
            methods,
            accessible: true,
        }
    }
}

/// A caller-scoped view of one resource
pub struct ResourceView {
    resource: Arc<Resource>,
    /// Methods the caller may invoke; empty for the placeholder
    methods: Arc<HashSet<AccessMethod>>,
    /// False for the inaccessible placeholder, whose every operation
    /// reports not-authorized without revealing the resource kind
    accessible: bool,
}

impl std::fmt::Debug for ResourceView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceView")
            .field("path", self.resource.path())
            .field("methods", &self.methods)
            .finish()
    }
}

impl ResourceView {
    fn inaccessible(resource: Arc<Resource>) -> Self {
        Self {
            resource,
            methods: Arc::new(HashSet::new()),
            accessible: false,
        }
    }

    fn authorize(&self, method: AccessMethod) -> Result<()> {
        if self.methods.contains(&method) {
            Ok(())
        } else {
            Err(Error::NotAuthorized(format!(
                "{method} on {}",
                self.resource.path()
            )))
        }
    }

    /// Whether the caller may invoke `method` through this view
    #[must_use]
    pub fn allows(&self, method: AccessMethod) -> bool {
        self.methods.contains(&method)
    }

    /// Read an attribute value (the default attribute when unnamed).
    ///
    /// # Errors
    ///
    /// [`Error::NotAuthorized`] when GET is not accessible;
    /// [`Error::UnknownMethod`] when the kind has no value slot.
    pub fn get(&self, attribute: Option<&str>) -> Result<(TypedValue, DateTime<Utc>)> {
        self.check_supported(AccessMethod::Get)?;
        self.authorize(AccessMethod::Get)?;
        self.resource.value(attribute)
    }

    /// Write an attribute value as the caller.
    ///
    /// # Errors
    ///
    /// [`Error::NotAuthorized`], [`Error::UnknownMethod`], or the write
    /// errors of the underlying attribute.
    pub fn set(
        &self,
        attribute: Option<&str>,
        value: Value,
    ) -> Result<crate::model::UpdateOutcome> {
        self.check_supported(AccessMethod::Set)?;
        self.authorize(AccessMethod::Set)?;
        self.resource.update(attribute, value, WriteOrigin::Caller)
    }

    /// Execute the resource's action handler.
    ///
    /// # Errors
    ///
    /// [`Error::NotAuthorized`], [`Error::UnknownMethod`], or the handler's
    /// own error.
    pub fn act(&self, parameters: &[Value]) -> Result<Value> {
        self.check_supported(AccessMethod::Act)?;
        self.authorize(AccessMethod::Act)?;
        self.resource.act(parameters)
    }

    /// Authorize a subscription on this resource.
    ///
    /// # Errors
    ///
    /// [`Error::NotAuthorized`] or [`Error::UnknownMethod`].
    pub fn authorize_subscribe(&self) -> Result<()> {
        self.check_supported(AccessMethod::Subscribe)?;
        self.authorize(AccessMethod::Subscribe)
    }

    /// Authorize removing a subscription on this resource.
    ///
    /// # Errors
    ///
    /// [`Error::NotAuthorized`] or [`Error::UnknownMethod`].
    pub fn authorize_unsubscribe(&self) -> Result<()> {
        self.check_supported(AccessMethod::Unsubscribe)?;
        self.authorize(AccessMethod::Unsubscribe)
    }

    /// Describe the resource.
    ///
    /// # Errors
    ///
    /// [`Error::NotAuthorized`] for the inaccessible placeholder.
    pub fn describe(&self) -> Result<Value> {
        self.authorize(AccessMethod::Describe)?;
        Ok(self.resource.describe())
    }

    /// The underlying resource (crate-internal plumbing)
    pub(crate) fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    fn check_supported(&self, method: AccessMethod) -> Result<()> {
        if !self.accessible {
            // The placeholder never reveals what the resource supports
            return Err(Error::NotAuthorized(format!(
                "{method} on {}",
                self.resource.path()
            )));
        }
        if self.resource.supports(method) {
            Ok(())
        } else {
            Err(Error::UnknownMethod {
                method: method.to_string(),
                uri: self.resource.path().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessLevel, AccessTreeBuilder};
    use crate::model::{Provider, ResourceBuilder, ResourceKind, ValueType};
    use crate::notify::Notifier;
    use serde_json::json;

    fn fixture(tree: AccessTree) -> (ProxyFactory, Arc<Resource>) {
        let provider = Provider::new("p1", Notifier::disabled()).unwrap();
        let svc = provider.add_service("s1").unwrap();
        let res = svc
            .add_resource(
                ResourceBuilder::new("temp", ResourceKind::Property).value_type(ValueType::Float),
            )
            .unwrap();
        provider.start();
        (ProxyFactory::new(Arc::new(tree)), res)
    }

    #[test]
    fn insufficient_describe_yields_placeholder() {
        let tree = AccessTreeBuilder::new().owner("root").build();
        let (factory, res) = fixture(tree);
        let profile = AccessProfile::new(Arc::clone(factory.tree()), "guest");
        let view = factory.resource_view(&res, &profile);
        assert!(!view.allows(AccessMethod::Get));
        assert!(matches!(view.get(None), Err(Error::NotAuthorized(_))));
        assert!(matches!(view.describe(), Err(Error::NotAuthorized(_))));
    }

    #[test]
    fn view_exposes_only_sufficient_methods() {
        // Anonymous default: GET visible, SET requires Authenticated
        let tree = AccessTreeBuilder::new()
            .default_level("/", AccessLevel::Anonymous)
            .build();
        let (factory, res) = fixture(tree);
        let profile = AccessProfile::new(Arc::clone(factory.tree()), "guest");
        let view = factory.resource_view(&res, &profile);
        assert!(view.allows(AccessMethod::Get));
        assert!(!view.allows(AccessMethod::Set));
        assert!(matches!(
            view.set(None, json!(1.0)),
            Err(Error::NotAuthorized(_))
        ));
    }

    #[test]
    fn views_are_memoized_per_level_and_cleared_on_stop() {
        let tree = AccessTreeBuilder::new()
            .default_level("/", AccessLevel::Authenticated)
            .build();
        let (factory, res) = fixture(tree);
        let profile = AccessProfile::new(Arc::clone(factory.tree()), "alice");
        let _ = factory.resource_view(&res, &profile);
        assert!(res.cached_view(AccessLevel::Authenticated).is_some());
        res.stop();
        assert!(res.cached_view(AccessLevel::Authenticated).is_none());
    }

    #[test]
    fn act_on_value_resource_reports_unknown_method() {
        let tree = AccessTreeBuilder::new()
            .default_level("/", AccessLevel::Admin)
            .build();
        let (factory, res) = fixture(tree);
        let profile = AccessProfile::new(Arc::clone(factory.tree()), "root");
        let view = factory.resource_view(&res, &profile);
        assert!(matches!(view.act(&[]), Err(Error::UnknownMethod { .. })));
    }
}
