//! Process-wide registry of entity-tree roots
//!
//! One handle per registered provider, keyed by name. Internal queries are
//! typed predicates; the string filter accepted at the listing API boundary
//! is translated into one before it gets here.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::model::Provider;
use crate::{Error, Result};

/// Typed provider query used internally.
///
/// The external `name` / `name*` string filter surface translates into this.
#[derive(Debug, Clone, Default)]
pub struct ProviderQuery {
    /// Exact name, or prefix when `wildcard` is set
    pub name: Option<String>,
    /// Treat `name` as a prefix
    pub wildcard: bool,
}

impl ProviderQuery {
    /// Translate a boundary filter string (`"name"` or `"prefix*"`).
    ///
    /// `None` or `"*"` matches everything.
    #[must_use]
    pub fn from_filter(filter: Option<&str>) -> Self {
        match filter {
            None | Some("*" | "") => Self::default(),
            Some(s) => s.strip_suffix('*').map_or_else(
                || Self {
                    name: Some(s.to_string()),
                    wildcard: false,
                },
                |prefix| Self {
                    name: Some(prefix.to_string()),
                    wildcard: true,
                },
            ),
        }
    }

    fn matches(&self, name: &str) -> bool {
        self.name.as_deref().is_none_or(|wanted| {
            if self.wildcard {
                name.starts_with(wanted)
            } else {
                name == wanted
            }
        })
    }
}

/// Name-keyed directory of registered providers
#[derive(Debug, Default)]
pub struct ModelRegistry {
    providers: RwLock<BTreeMap<String, Arc<Provider>>>,
}

impl ModelRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider root.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyRegistered`] when the name is taken.
    pub fn register(&self, provider: Arc<Provider>) -> Result<()> {
        let mut providers = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if providers.contains_key(provider.name()) {
            return Err(Error::AlreadyRegistered(provider.name().to_string()));
        }
        providers.insert(provider.name().to_string(), provider);
        Ok(())
    }

    /// Remove a provider root.
    ///
    /// # Errors
    ///
    /// [`Error::NotRegistered`] for unknown names.
    pub fn unregister(&self, name: &str) -> Result<Arc<Provider>> {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .ok_or_else(|| Error::NotRegistered(name.to_string()))
    }

    /// Look up one provider
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Provider>> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// All providers, name-ordered
    #[must_use]
    pub fn providers(&self) -> Vec<Arc<Provider>> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Providers matching a typed query, name-ordered
    #[must_use]
    pub fn query(&self, query: &ProviderQuery) -> Vec<Arc<Provider>> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(name, _)| query.matches(name))
            .map(|(_, p)| Arc::clone(p))
            .collect()
    }

    /// Number of registered providers
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Notifier;

    fn provider(name: &str) -> Arc<Provider> {
        Provider::new(name, Notifier::disabled()).unwrap()
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = ModelRegistry::new();
        registry.register(provider("p1")).unwrap();
        assert!(matches!(
            registry.register(provider("p1")),
            Err(Error::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn unregister_unknown_is_an_error() {
        let registry = ModelRegistry::new();
        assert!(matches!(
            registry.unregister("ghost"),
            Err(Error::NotRegistered(_))
        ));
    }

    #[test]
    fn query_translates_boundary_filters() {
        let registry = ModelRegistry::new();
        registry.register(provider("light-1")).unwrap();
        registry.register(provider("light-2")).unwrap();
        registry.register(provider("thermo")).unwrap();

        let all = registry.query(&ProviderQuery::from_filter(None));
        assert_eq!(all.len(), 3);

        let lights = registry.query(&ProviderQuery::from_filter(Some("light-*")));
        assert_eq!(lights.len(), 2);

        let exact = registry.query(&ProviderQuery::from_filter(Some("thermo")));
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].name(), "thermo");

        assert!(
            registry
                .query(&ProviderQuery::from_filter(Some("nope")))
                .is_empty()
        );
    }
}
