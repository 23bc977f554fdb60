//! The gateway facade: northbound boundary operations
//!
//! Wire-protocol bindings call these methods with a session token and get a
//! structured [`AccessResponse`] back; validation failures never cross this
//! boundary as errors. Calls on namespace-qualified provider ids are routed
//! to the federation peer registered under that namespace.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use serde_json::{Value, json};

use crate::access::{AccessMethod, AccessTree};
use crate::federation::{PeerRegistry, RemoteCore, RemoteEndpoint, qualify, split_qualified};
use crate::model::{Lifecycle, Provider, Resource, Service};
use crate::notify::{
    Agent, DeliveryDefaults, DeliveryMode, ErrorPolicy, GatewayMessage, MessageConstraint,
    MessageFilter, MessagePropagator, MessageType, NotificationSink, Notifier, ResponseKind,
};
use crate::proxy::{ProxyFactory, ResourceView};
use crate::registry::{ModelRegistry, ProviderQuery};
use crate::session::{Session, SessionManager};
use crate::{Error, Result};

/// Addressing tuple for one resource, possibly namespace-qualified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceAddress {
    /// Provider id, optionally `namespace:`-qualified
    pub provider: String,
    /// Service id
    pub service: String,
    /// Resource id
    pub resource: String,
    /// Attribute id; the resource's default attribute when `None`
    pub attribute: Option<String>,
}

impl ResourceAddress {
    /// Address a resource's default attribute
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        service: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            service: service.into(),
            resource: resource.into(),
            attribute: None,
        }
    }

    /// Address a specific attribute
    #[must_use]
    pub fn attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// URI form of the address
    #[must_use]
    pub fn uri(&self) -> String {
        let mut uri = format!("/{}/{}/{}", self.provider, self.service, self.resource);
        if let Some(attr) = &self.attribute {
            uri.push('/');
            uri.push_str(attr);
        }
        uri
    }

    /// Split off a namespace qualifier, returning it and the local address
    #[must_use]
    pub fn localized(&self) -> (Option<String>, Self) {
        let (namespace, provider) = split_qualified(&self.provider);
        let mut local = self.clone();
        local.provider = provider.to_string();
        (namespace.map(str::to_string), local)
    }
}

/// Delivery parameters of a subscribe call
#[derive(Debug, Clone)]
pub struct SubscriptionRequest {
    /// Buffering/scheduling policy
    pub mode: DeliveryMode,
    /// Error handling policy on sink failure
    pub error_policy: ErrorPolicy,
    /// Payload constraints ANDed with the path/type match
    pub constraints: Vec<MessageConstraint>,
    /// Optional lifetime; at or below 10 s means no expiry
    pub lifetime: Option<std::time::Duration>,
}

impl Default for SubscriptionRequest {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::Unary,
            error_policy: ErrorPolicy::default(),
            constraints: Vec::new(),
            lifetime: None,
        }
    }
}

/// Structured response returned by every boundary operation
#[derive(Debug, Clone, Serialize)]
pub struct AccessResponse {
    /// Response kind, `ERROR` for failures
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    /// Target URI of the call
    pub uri: String,
    /// HTTP-style status code (200, 4xx, 420)
    #[serde(rename = "statusCode")]
    pub status: u16,
    /// Response payload on success
    #[serde(skip_serializing_if = "Value::is_null")]
    pub response: Value,
    /// Error details on failure
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl AccessResponse {
    /// A 200 response with a payload
    #[must_use]
    pub const fn success(kind: ResponseKind, uri: String, response: Value) -> Self {
        Self {
            kind,
            uri,
            status: 200,
            response,
            errors: Vec::new(),
        }
    }

    /// A structured failure derived from an [`Error`]
    #[must_use]
    pub fn failure(uri: String, error: &Error) -> Self {
        Self {
            kind: ResponseKind::Error,
            uri,
            status: error.status_code(),
            response: Value::Null,
            errors: vec![error.to_string()],
        }
    }

    /// Whether the call succeeded
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status == 200
    }

    /// Re-qualify the response URI with the origin namespace before it
    /// reaches a caller on another instance
    #[must_use]
    pub fn qualified(mut self, namespace: &str) -> Self {
        if let Some(rest) = self.uri.strip_prefix('/') {
            self.uri = format!("/{namespace}:{rest}");
        }
        self
    }
}

/// One gateway instance
pub struct Gateway {
    namespace: String,
    registry: ModelRegistry,
    propagator: MessagePropagator,
    sessions: SessionManager,
    factory: ProxyFactory,
    peers: PeerRegistry,
    /// Agents to mirror onto peers: id → (identity, filter)
    mirrored: tokio::sync::Mutex<HashMap<String, (String, Option<MessageFilter>)>>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Create a gateway instance resolving access against `tree`.
    ///
    /// Call [`Self::start`] from within a tokio runtime to begin dispatching
    /// notifications.
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        tree: Arc<AccessTree>,
        defaults: DeliveryDefaults,
    ) -> Arc<Self> {
        Arc::new(Self {
            namespace: namespace.into(),
            registry: ModelRegistry::new(),
            propagator: MessagePropagator::new(defaults),
            sessions: SessionManager::new(Arc::clone(&tree)),
            factory: ProxyFactory::new(tree),
            peers: PeerRegistry::new(),
            mirrored: tokio::sync::Mutex::new(HashMap::new()),
        })
    }

    /// This instance's namespace
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Start the notification dispatch worker
    pub fn start(&self) {
        self.propagator.start();
    }

    /// Close every session, disconnect every peer, stop dispatching
    pub async fn shutdown(&self) {
        for token in self.sessions.tokens() {
            self.close_session(&token).await;
        }
        for core in self.peers.all() {
            self.peers.detach(core.namespace());
            core.disconnect().await;
        }
        self.propagator.shutdown().await;
    }

    /// Publishing handle for drivers that emit outside the entity tree
    #[must_use]
    pub fn notifier(&self) -> Notifier {
        self.propagator.notifier()
    }

    // -- Driver-facing model management --

    /// Create and register a provider root.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPath`] or [`Error::AlreadyRegistered`].
    pub fn create_provider(&self, name: &str) -> Result<Arc<Provider>> {
        let provider = Provider::new(name, self.propagator.notifier())?;
        self.registry.register(Arc::clone(&provider))?;
        Ok(provider)
    }

    /// Stop and unregister a provider root.
    ///
    /// # Errors
    ///
    /// [`Error::NotRegistered`] for unknown names.
    pub fn remove_provider(&self, name: &str) -> Result<()> {
        let provider = self.registry.unregister(name)?;
        provider.stop();
        Ok(())
    }

    /// Look up a registered provider
    #[must_use]
    pub fn provider(&self, name: &str) -> Option<Arc<Provider>> {
        self.registry.get(name)
    }

    // -- Sessions --

    /// Open a session for a caller identity, resolving its access snapshot
    pub fn open_session(&self, identity: &str) -> Arc<Session> {
        self.sessions.open(identity)
    }

    /// Close a session, cascading cleanup of owned callbacks and agents.
    ///
    /// Idempotent; teardown errors are logged and swallowed so teardown
    /// always completes.
    pub async fn close_session(&self, token: &str) {
        let Some(session) = self.sessions.remove(token) else {
            return;
        };
        for callback in session.owned_callbacks() {
            self.propagator.unsubscribe(&callback).await;
        }
        for agent in session.owned_agents() {
            self.unregister_agent(&agent).await;
        }
        tracing::debug!(token, "session closed");
    }

    // -- Federation --

    /// Connect a peer endpoint and register it under its namespace.
    ///
    /// Already-mirrored agents are registered on the new peer.
    ///
    /// # Errors
    ///
    /// Handshake errors, or [`Error::AlreadyRegistered`] when a peer already
    /// holds the namespace (the new connection is torn down again).
    pub async fn connect_peer(&self, endpoint: Arc<dyn RemoteEndpoint>) -> Result<Arc<RemoteCore>> {
        let core = Arc::new(RemoteCore::new(endpoint));
        core.connect().await?;
        if let Err(e) = self.peers.attach(Arc::clone(&core)) {
            core.disconnect().await;
            return Err(e);
        }
        let mirrored = self.mirrored.lock().await.clone();
        for (id, (identity, filter)) in mirrored {
            if let Err(e) = core.endpoint().register_agent(&identity, &id, filter).await {
                tracing::warn!(
                    namespace = core.namespace(),
                    agent = %id,
                    error = %e,
                    "failed to mirror agent onto peer"
                );
            }
        }
        Ok(core)
    }

    /// Disconnect and forget a peer. Idempotent.
    pub async fn disconnect_peer(&self, namespace: &str) {
        if let Some(core) = self.peers.detach(namespace) {
            core.disconnect().await;
        }
    }

    /// Relay a batch of messages to a locally registered agent.
    ///
    /// Called by federation endpoints delivering on behalf of a peer.
    pub async fn deliver_to_agent(&self, agent_id: &str, messages: Vec<GatewayMessage>) {
        if let Some(sink) = self.propagator.agent_sink(agent_id).await {
            if let Err(e) = sink.deliver(messages).await {
                tracing::warn!(agent = agent_id, error = %e, "relayed delivery failed");
            }
        } else {
            tracing::debug!(agent = agent_id, "relay for unknown agent dropped");
        }
    }

    /// Register a relay agent mirroring a peer's agent under its opaque id.
    ///
    /// Access is gated with this instance's tree resolved for `identity`.
    pub async fn register_relay_agent(
        &self,
        agent_id: &str,
        identity: &str,
        filter: Option<MessageFilter>,
        sink: Arc<dyn NotificationSink>,
    ) {
        let profile = crate::access::AccessProfile::new(Arc::clone(self.factory.tree()), identity);
        let agent = Agent::with_id(agent_id, profile, filter, sink);
        self.propagator.register_agent(agent).await;
    }

    /// Remove a relay agent locally only, without mirroring the removal.
    ///
    /// Called by federation endpoints when the agent's home instance
    /// unregisters it. Idempotent.
    pub async fn unregister_relay_agent(&self, agent_id: &str) {
        self.propagator.unregister_agent(agent_id).await;
    }

    // -- Agents --

    /// Register a cross-cutting agent owned by the session.
    ///
    /// The registration is mirrored onto every connected peer.
    ///
    /// # Errors
    ///
    /// [`Error::SessionClosed`] for unknown tokens.
    pub async fn register_agent(
        &self,
        token: &str,
        filter: Option<MessageFilter>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<String> {
        let session = self.sessions.get(token)?;
        let agent = Agent::new(session.profile().clone(), filter.clone(), sink).owned_by(token);
        let id = agent.id().to_string();
        self.propagator.register_agent(agent).await;
        session.track_agent(&id);
        self.mirrored
            .lock()
            .await
            .insert(id.clone(), (session.identity().to_string(), filter.clone()));
        let mirrors = self.peers.connected().into_iter().map(|core| {
            let filter = filter.clone();
            let id = id.clone();
            let identity = session.identity().to_string();
            async move {
                let outcome = core.endpoint().register_agent(&identity, &id, filter).await;
                (core, outcome)
            }
        });
        for (core, outcome) in join_all(mirrors).await {
            if let Err(e) = outcome {
                tracing::warn!(
                    namespace = core.namespace(),
                    agent = %id,
                    error = %e,
                    "failed to mirror agent onto peer"
                );
            }
        }
        Ok(id)
    }

    /// Unregister an agent locally and on every connected peer.
    ///
    /// Idempotent: unknown ids are a no-op, not an error.
    pub async fn unregister_agent(&self, agent_id: &str) {
        self.propagator.unregister_agent(agent_id).await;
        self.mirrored.lock().await.remove(agent_id);
        for token in self.sessions.tokens() {
            if let Ok(session) = self.sessions.get(&token) {
                session.untrack_agent(agent_id);
            }
        }
        let removals = self.peers.connected().into_iter().map(|core| {
            let agent_id = agent_id.to_string();
            async move {
                let outcome = core.endpoint().unregister_agent(&agent_id).await;
                (core, outcome)
            }
        });
        for (core, outcome) in join_all(removals).await {
            if let Err(e) = outcome {
                tracing::warn!(
                    namespace = core.namespace(),
                    agent = agent_id,
                    error = %e,
                    "failed to unmirror agent from peer"
                );
            }
        }
    }

    // -- Boundary operations --

    /// Read a resource value
    pub async fn get(&self, token: &str, address: &ResourceAddress) -> AccessResponse {
        let uri = address.uri();
        let session = match self.sessions.get(token) {
            Ok(s) => s,
            Err(e) => return AccessResponse::failure(uri, &e),
        };
        let (namespace, local) = address.localized();
        if let Some(ns) = foreign(namespace, &self.namespace) {
            return match self.peer_endpoint(&ns) {
                Ok(endpoint) => match endpoint.get(session.identity(), &local).await {
                    Ok(resp) => resp.qualified(&ns),
                    Err(e) => AccessResponse::failure(uri, &e),
                },
                Err(e) => AccessResponse::failure(uri, &e),
            };
        }
        let outcome = self
            .local_view(&session, &local)
            .and_then(|view| view.get(local.attribute.as_deref()));
        let response = match outcome {
            Ok((value, timestamp)) => AccessResponse::success(
                ResponseKind::GetResponse,
                uri,
                json!({
                    "value": value.to_json(),
                    "timestamp": timestamp.to_rfc3339(),
                }),
            ),
            Err(e) => AccessResponse::failure(uri, &e),
        };
        self.emit_outcome(&response);
        response
    }

    /// Write a resource value
    pub async fn set(&self, token: &str, address: &ResourceAddress, value: Value) -> AccessResponse {
        let uri = address.uri();
        let session = match self.sessions.get(token) {
            Ok(s) => s,
            Err(e) => return AccessResponse::failure(uri, &e),
        };
        let (namespace, local) = address.localized();
        if let Some(ns) = foreign(namespace, &self.namespace) {
            return match self.peer_endpoint(&ns) {
                Ok(endpoint) => match endpoint.set(session.identity(), &local, value).await {
                    Ok(resp) => resp.qualified(&ns),
                    Err(e) => AccessResponse::failure(uri, &e),
                },
                Err(e) => AccessResponse::failure(uri, &e),
            };
        }
        let outcome = self
            .local_view(&session, &local)
            .and_then(|view| view.set(local.attribute.as_deref(), value));
        let response = match outcome {
            Ok(update) => AccessResponse::success(
                ResponseKind::SetResponse,
                uri,
                json!({
                    "value": update.new.to_json(),
                    "hasChanged": update.has_changed,
                    "timestamp": update.timestamp.to_rfc3339(),
                }),
            ),
            Err(e) => AccessResponse::failure(uri, &e),
        };
        self.emit_outcome(&response);
        response
    }

    /// Execute an action resource
    pub async fn act(
        &self,
        token: &str,
        address: &ResourceAddress,
        parameters: Vec<Value>,
    ) -> AccessResponse {
        let uri = address.uri();
        let session = match self.sessions.get(token) {
            Ok(s) => s,
            Err(e) => return AccessResponse::failure(uri, &e),
        };
        let (namespace, local) = address.localized();
        if let Some(ns) = foreign(namespace, &self.namespace) {
            return match self.peer_endpoint(&ns) {
                Ok(endpoint) => match endpoint.act(session.identity(), &local, parameters).await {
                    Ok(resp) => resp.qualified(&ns),
                    Err(e) => AccessResponse::failure(uri, &e),
                },
                Err(e) => AccessResponse::failure(uri, &e),
            };
        }
        let outcome = self
            .local_view(&session, &local)
            .and_then(|view| view.act(&parameters));
        let response = match outcome {
            Ok(result) => {
                AccessResponse::success(ResponseKind::ActResponse, uri, json!({ "result": result }))
            }
            Err(e) => AccessResponse::failure(uri, &e),
        };
        self.emit_outcome(&response);
        response
    }

    /// Subscribe to a resource's value updates, delivering into `sink`
    pub async fn subscribe(
        &self,
        token: &str,
        address: &ResourceAddress,
        sink: Arc<dyn NotificationSink>,
        request: SubscriptionRequest,
    ) -> AccessResponse {
        let uri = address.uri();
        let session = match self.sessions.get(token) {
            Ok(s) => s,
            Err(e) => return AccessResponse::failure(uri, &e),
        };
        let (namespace, local) = address.localized();
        if let Some(ns) = foreign(namespace, &self.namespace) {
            return match self.peer_endpoint(&ns) {
                Ok(endpoint) => {
                    match endpoint
                        .subscribe(session.identity(), &local, sink, request)
                        .await
                    {
                        Ok(resp) => resp.qualified(&ns),
                        Err(e) => AccessResponse::failure(uri, &e),
                    }
                }
                Err(e) => AccessResponse::failure(uri, &e),
            };
        }
        let view = match self.local_view(&session, &local) {
            Ok(view) => view,
            Err(e) => return AccessResponse::failure(uri, &e),
        };
        if let Err(e) = view.authorize_subscribe() {
            return AccessResponse::failure(uri, &e);
        }
        let mut filter = MessageFilter::literal(local.uri()).types([MessageType::AttributeValueUpdated]);
        for constraint in request.constraints {
            filter = filter.constraint(constraint);
        }
        let id = self
            .propagator
            .subscribe(filter, sink, request.mode, request.error_policy, request.lifetime)
            .await;
        view.resource().inc_subscriptions();
        session.track_callback(&id);
        AccessResponse::success(
            ResponseKind::SubscribeResponse,
            uri,
            json!({ "subscriptionId": id }),
        )
    }

    /// Remove a subscription. Unknown ids report `removed: false`.
    pub async fn unsubscribe(
        &self,
        token: &str,
        address: &ResourceAddress,
        subscription: &str,
    ) -> AccessResponse {
        let uri = address.uri();
        let session = match self.sessions.get(token) {
            Ok(s) => s,
            Err(e) => return AccessResponse::failure(uri, &e),
        };
        let (namespace, local) = address.localized();
        if let Some(ns) = foreign(namespace, &self.namespace) {
            return match self.peer_endpoint(&ns) {
                Ok(endpoint) => {
                    match endpoint
                        .unsubscribe(session.identity(), &local, subscription)
                        .await
                    {
                        Ok(resp) => resp.qualified(&ns),
                        Err(e) => AccessResponse::failure(uri, &e),
                    }
                }
                Err(e) => AccessResponse::failure(uri, &e),
            };
        }
        let view = match self.local_view(&session, &local) {
            Ok(view) => view,
            Err(e) => return AccessResponse::failure(uri, &e),
        };
        if let Err(e) = view.authorize_unsubscribe() {
            return AccessResponse::failure(uri, &e);
        }
        let removed = self.propagator.unsubscribe(subscription).await;
        if removed {
            view.resource().dec_subscriptions();
            session.untrack_callback(subscription);
        }
        AccessResponse::success(
            ResponseKind::UnsubscribeResponse,
            uri,
            json!({ "removed": removed }),
        )
    }

    // -- Listings --

    /// Provider ids visible to the session, including qualified ids from
    /// connected peers.
    ///
    /// Inaccessible providers are silently omitted, indistinguishable from
    /// absent ones.
    pub async fn get_providers(&self, token: &str, filter: Option<&str>) -> AccessResponse {
        let uri = "/providers".to_string();
        let session = match self.sessions.get(token) {
            Ok(s) => s,
            Err(e) => return AccessResponse::failure(uri, &e),
        };
        let query = ProviderQuery::from_filter(filter);
        let mut names: Vec<String> = self
            .registry
            .query(&query)
            .into_iter()
            .filter(|p| p.lifecycle() == Lifecycle::Started)
            .filter(|p| {
                session
                    .profile()
                    .can(p.path().as_str(), AccessMethod::Describe)
            })
            .map(|p| p.name().to_string())
            .collect();
        for core in self.peers.connected() {
            match core.endpoint().providers(session.identity()).await {
                Ok(remote) => {
                    names.extend(remote.iter().map(|id| qualify(core.namespace(), id)));
                }
                Err(e) => {
                    tracing::warn!(
                        namespace = core.namespace(),
                        error = %e,
                        "peer listing failed"
                    );
                }
            }
        }
        AccessResponse::success(
            ResponseKind::DescribeResponse,
            uri,
            json!({ "providers": names }),
        )
    }

    /// Service ids of one local provider visible to the session
    pub fn get_services(&self, token: &str, provider: &str) -> AccessResponse {
        let uri = format!("/{provider}");
        let session = match self.sessions.get(token) {
            Ok(s) => s,
            Err(e) => return AccessResponse::failure(uri, &e),
        };
        let Some(found) = self.visible_provider(&session, provider) else {
            return AccessResponse::failure(uri.clone(), &Error::NotFound(uri));
        };
        let services: Vec<String> = found
            .services()
            .into_iter()
            .filter(|s| s.lifecycle() == Lifecycle::Started)
            .filter(|s| {
                session
                    .profile()
                    .can(s.path().as_str(), AccessMethod::Describe)
            })
            .map(|s| s.name().to_string())
            .collect();
        AccessResponse::success(
            ResponseKind::DescribeResponse,
            uri,
            json!({ "services": services }),
        )
    }

    /// Resource summaries of one local service visible to the session
    pub fn get_resources(&self, token: &str, provider: &str, service: &str) -> AccessResponse {
        let uri = format!("/{provider}/{service}");
        let session = match self.sessions.get(token) {
            Ok(s) => s,
            Err(e) => return AccessResponse::failure(uri, &e),
        };
        let Some(found) = self
            .visible_provider(&session, provider)
            .and_then(|p| p.service(service))
            .filter(|s| s.lifecycle() == Lifecycle::Started)
            .filter(|s| {
                session
                    .profile()
                    .can(s.path().as_str(), AccessMethod::Describe)
            })
        else {
            return AccessResponse::failure(uri.clone(), &Error::NotFound(uri));
        };
        let resources: Vec<Value> = found
            .resources()
            .into_iter()
            .filter(|r| r.lifecycle() == Lifecycle::Started)
            .filter(|r| {
                session
                    .profile()
                    .can(r.path().as_str(), AccessMethod::Describe)
            })
            .map(|r| resource_summary(&r))
            .collect();
        AccessResponse::success(
            ResponseKind::DescribeResponse,
            uri,
            json!({ "resources": resources }),
        )
    }

    /// Flattened listing of every visible resource with its capability
    pub fn get_all(&self, token: &str, filter: Option<&str>) -> AccessResponse {
        let uri = "/".to_string();
        let session = match self.sessions.get(token) {
            Ok(s) => s,
            Err(e) => return AccessResponse::failure(uri, &e),
        };
        let query = ProviderQuery::from_filter(filter);
        let mut entries = Vec::new();
        for provider in self.registry.query(&query) {
            if provider.lifecycle() != Lifecycle::Started
                || !session
                    .profile()
                    .can(provider.path().as_str(), AccessMethod::Describe)
            {
                continue;
            }
            for service in provider.services() {
                if service.lifecycle() != Lifecycle::Started
                    || !session
                        .profile()
                        .can(service.path().as_str(), AccessMethod::Describe)
                {
                    continue;
                }
                for resource in service.resources() {
                    if resource.lifecycle() != Lifecycle::Started
                        || !session
                            .profile()
                            .can(resource.path().as_str(), AccessMethod::Describe)
                    {
                        continue;
                    }
                    entries.push(resource_summary(&resource));
                }
            }
        }
        AccessResponse::success(ResponseKind::DescribeResponse, uri, json!({ "all": entries }))
    }

    /// Describe the entity at a path (provider, service or resource depth)
    pub fn describe(&self, token: &str, path: &str) -> AccessResponse {
        let uri = path.to_string();
        let session = match self.sessions.get(token) {
            Ok(s) => s,
            Err(e) => return AccessResponse::failure(uri, &e),
        };
        let parsed = match crate::model::ResourcePath::parse(path) {
            Ok(p) => p,
            Err(e) => return AccessResponse::failure(uri, &e),
        };
        fn not_found(uri: &str) -> AccessResponse {
            AccessResponse::failure(uri.to_string(), &Error::NotFound(uri.to_string()))
        }

        let Some(provider) = parsed
            .provider()
            .and_then(|name| self.visible_provider(&session, name))
        else {
            return not_found(&uri);
        };
        let Some(service_name) = parsed.service() else {
            return AccessResponse::success(ResponseKind::DescribeResponse, uri, provider.describe());
        };
        let Some(service) = provider
            .service(service_name)
            .filter(|s| s.lifecycle() == Lifecycle::Started)
            .filter(|s| {
                session
                    .profile()
                    .can(s.path().as_str(), AccessMethod::Describe)
            })
        else {
            return not_found(&uri);
        };
        let Some(resource_name) = parsed.resource() else {
            return AccessResponse::success(ResponseKind::DescribeResponse, uri, service.describe());
        };
        let Some(resource) = service
            .resource(resource_name)
            .filter(|r| r.lifecycle() == Lifecycle::Started)
        else {
            return not_found(&uri);
        };
        let view = self.factory.resource_view(&resource, session.profile());
        match view.describe() {
            // Hide unauthorized resources behind not-found
            Err(_) => not_found(&uri),
            Ok(description) => {
                AccessResponse::success(ResponseKind::DescribeResponse, uri, description)
            }
        }
    }

    // -- Internals --

    fn visible_provider(&self, session: &Session, name: &str) -> Option<Arc<Provider>> {
        self.registry
            .get(name)
            .filter(|p| p.lifecycle() == Lifecycle::Started)
            .filter(|p| {
                session
                    .profile()
                    .can(p.path().as_str(), AccessMethod::Describe)
            })
    }

    fn local_view(&self, session: &Session, address: &ResourceAddress) -> Result<ResourceView> {
        let resource = self
            .find_resource(address)
            .ok_or_else(|| Error::NotFound(address.uri()))?;
        Ok(self.factory.resource_view(&resource, session.profile()))
    }

    fn find_resource(&self, address: &ResourceAddress) -> Option<Arc<Resource>> {
        let provider = self.registry.get(&address.provider)?;
        if provider.lifecycle() != Lifecycle::Started {
            return None;
        }
        let service: Arc<Service> = provider.service(&address.service)?;
        if service.lifecycle() != Lifecycle::Started {
            return None;
        }
        service
            .resource(&address.resource)
            .filter(|r| r.lifecycle() == Lifecycle::Started)
    }

    fn peer_endpoint(&self, namespace: &str) -> Result<Arc<dyn RemoteEndpoint>> {
        let core = self.peers.get(namespace)?;
        if !core.is_connected() {
            return Err(Error::UnknownNamespace(namespace.to_string()));
        }
        Ok(Arc::clone(core.endpoint()))
    }

    /// Relay a call outcome into the notification engine
    fn emit_outcome(&self, response: &AccessResponse) {
        let notifier = self.propagator.notifier();
        if response.is_success() {
            notifier.send(GatewayMessage::Response {
                response: response.kind,
                path: response.uri.clone(),
                status: response.status,
                payload: response.response.clone(),
            });
        } else {
            notifier.send(GatewayMessage::Error {
                path: response.uri.clone(),
                detail: response.errors.join("; "),
            });
        }
    }
}

fn resource_summary(resource: &Arc<Resource>) -> Value {
    let mut doc = json!({
        "uri": resource.path().as_str(),
        "name": resource.name(),
        "type": resource.kind(),
    });
    if let Some(rws) = resource.rws() {
        doc["rws"] = json!(rws);
    }
    doc
}

/// A namespace that routes to a peer (anything other than our own)
fn foreign(namespace: Option<String>, own: &str) -> Option<String> {
    namespace.filter(|ns| ns != own)
}
