//! # The Scope — heart of Warren
//!
//! A [`Scope`] resolves requests for identifiers into instances, caches
//! them for its own lifetime and delegates to its ancestors for anything it
//! does not register itself.
//!
//! # Architecture
//! ```text
//! ScopeBuilder ──build()──> Scope (root)
//!                             │
//!                       create_child()
//!                             │
//!                             ▼
//!                           Scope ── weak parent link ──> root
//! ```
//!
//! Caching requests are answered by a topological batch: the engine walks
//! everything the requested node transitively needs, then instantiates the
//! resulting graph root by root, so each shared dependency is built once
//! and cycles are reported with their full path.
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//! use warren_container::prelude::*;
//!
//! trait Logger: Send + Sync {
//!     fn log(&self, msg: &str) -> String;
//! }
//!
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger {
//!     fn log(&self, msg: &str) -> String { format!("[console] {msg}") }
//! }
//!
//! struct UserService {
//!     logger: Arc<Arc<dyn Logger>>,
//! }
//!
//! let logger = Identifier::new("doc.container.logger");
//! let users = Identifier::new("doc.container.users");
//!
//! let scope = Scope::builder()
//!     .name("app")
//!     .with(&logger, DependencyItem::value(Arc::new(ConsoleLogger) as Arc<dyn Logger>))
//!     .with(&users, DependencyItem::factory(vec![Dep::new(&logger)], |args| {
//!         Ok(Instance::new(UserService { logger: args.required(0)? }))
//!     }))
//!     .build();
//!
//! let service = scope.get_as::<UserService>(&users).expect("Failed to resolve");
//! assert_eq!(service.logger.log("hi"), "[console] hi");
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::OnceCell;
use tracing::{debug, instrument, trace, warn};
use warren_support::rendering::suggest_similar;

use crate::collection::{DependencyCollection, ResolvedCollection, shape};
use crate::config::ScopeConfig;
use crate::declaration::Descriptor;
use crate::error::{
    CircularDependencyError, ContainerError, MissingParameterError, Mutation, NotFoundError,
    Result,
};
use crate::graph::ResolutionGraph;
use crate::hook::{AsyncHook, Slot};
use crate::identifier::Identifier;
use crate::idle::IdleValue;
use crate::instance::{Disposable, Instance};
use crate::item::{AsyncItem, ClassItem, DependencyItem, FactoryItem, InstantiationHook};
use crate::modifier::{Cardinality, Lookup, Query, Resolved};
use crate::producer::{Arg, Args, Producer, Provider, ProviderRegistry};
use crate::singletons::singleton_dependencies;
use crate::trail::{self, Frame};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

type Callback = Box<dyn FnOnce() + Send>;

/// Graph node: owning scope id plus identifier.
type NodeKey = (u64, Identifier);

// ═══════════════════════════════════════════
// ScopeBuilder
// ═══════════════════════════════════════════

/// Builds a [`Scope`] with its initial registrations.
///
/// # Examples
/// ```rust,ignore
/// let root = Scope::builder()
///     .name("app")
///     .with(&config, DependencyItem::value(Config::load()))
///     .provider(&StorageProvider)
///     .build();
///
/// let request = Scope::builder().name("request").build_child(&root)?;
/// ```
pub struct ScopeBuilder {
    config: Option<ScopeConfig>,
    name: Option<String>,
    max_resolution_depth: Option<usize>,
    registrations: Vec<(Identifier, DependencyItem)>,
    instances: Vec<(Identifier, Instance)>,
}

impl ScopeBuilder {
    fn new() -> Self {
        Self {
            config: None,
            name: None,
            max_resolution_depth: None,
            registrations: Vec::new(),
            instances: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn max_resolution_depth(mut self, depth: usize) -> Self {
        self.max_resolution_depth = Some(depth);
        self
    }

    /// Use a loaded [`ScopeConfig`]. Explicit `name` and
    /// `max_resolution_depth` calls still win.
    pub fn config(mut self, config: ScopeConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with(mut self, identifier: &Identifier, item: impl Into<DependencyItem>) -> Self {
        self.registrations.push((identifier.clone(), item.into()));
        self
    }

    /// Registers `producer` under its own identifier.
    pub fn with_class(self, producer: &Producer) -> Self {
        let identifier = producer.identifier().clone();
        self.with(&identifier, DependencyItem::class(producer.clone()))
    }

    /// Seeds the resolved registry with an already built instance.
    pub fn with_instance(mut self, identifier: &Identifier, instance: Instance) -> Self {
        self.instances.push((identifier.clone(), instance));
        self
    }

    /// Add a [`Provider`] module.
    pub fn provider(mut self, provider: &dyn Provider) -> Self {
        debug!(provider = provider.name(), "Installing provider");
        provider.register(&mut self);
        self
    }

    /// Installs the process-wide singleton registrations.
    pub fn with_singletons(mut self) -> Self {
        self.registrations.extend(singleton_dependencies());
        self
    }

    /// Builds a root scope.
    pub fn build(mut self) -> Scope {
        let config = self.take_config(ScopeConfig::default());
        Scope::from_parts(config, None, self.registrations, self.instances)
    }

    /// Builds a child of `parent`, inheriting its config except the name.
    ///
    /// # Errors
    /// [`ContainerError::ScopeDisposed`] if `parent` was disposed.
    pub fn build_child(mut self, parent: &Scope) -> Result<Scope> {
        parent.ensure_alive()?;
        let config = self.take_config(parent.inner.config.for_child());
        let child = Scope::from_parts(config, Some(parent), self.registrations, self.instances);
        parent.adopt(&child)?;
        Ok(child)
    }

    fn take_config(&mut self, base: ScopeConfig) -> ScopeConfig {
        let mut config = self.config.take().unwrap_or(base);
        if let Some(name) = self.name.take() {
            config.name = Some(name);
        }
        if let Some(depth) = self.max_resolution_depth {
            config.max_resolution_depth = depth;
        }
        config
    }
}

// ProviderRegistry impl so providers can register into the builder
impl ProviderRegistry for ScopeBuilder {
    fn register(&mut self, identifier: Identifier, item: DependencyItem) {
        self.registrations.push((identifier, item));
    }

    fn register_instance(&mut self, identifier: Identifier, instance: Instance) {
        self.instances.push((identifier, instance));
    }
}

// ═══════════════════════════════════════════
// Scope
// ═══════════════════════════════════════════

pub(crate) struct ScopeInner {
    id: u64,
    config: ScopeConfig,
    parent: Option<Weak<ScopeInner>>,
    depth: usize,
    state: Mutex<ScopeState>,
}

struct ScopeState {
    collection: DependencyCollection,
    resolved: ResolvedCollection,
    children: Vec<Scope>,
    callbacks: Vec<(u64, Callback)>,
    next_callback: u64,
    disposed: bool,
    /// One cell per (identifier, async registration), shared by every hook.
    pending: HashMap<(Identifier, usize), Arc<OnceCell<Instance>>>,
}

/// Hierarchical dependency container.
///
/// `Scope` is a cheap handle; clones refer to the same scope. A scope owns
/// its children, a child only holds a weak link to its parent.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// Create a new builder.
    pub fn builder() -> ScopeBuilder {
        ScopeBuilder::new()
    }

    /// Creates a root scope with the given registrations.
    pub fn new(items: Vec<(Identifier, DependencyItem)>) -> Scope {
        items
            .into_iter()
            .fold(Scope::builder(), |builder, (identifier, item)| builder.with(&identifier, item))
            .build()
    }

    fn from_parts(
        config: ScopeConfig,
        parent: Option<&Scope>,
        registrations: Vec<(Identifier, DependencyItem)>,
        instances: Vec<(Identifier, Instance)>,
    ) -> Scope {
        let mut collection = DependencyCollection::new();
        for (identifier, item) in registrations {
            collection.add(identifier, item);
        }

        let mut resolved = ResolvedCollection::new();
        for (identifier, instance) in instances {
            resolved.add(identifier, instance, true);
        }

        let scope = Scope {
            inner: Arc::new(ScopeInner {
                id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
                config,
                parent: parent.map(|parent| Arc::downgrade(&parent.inner)),
                depth: parent.map_or(0, |parent| parent.inner.depth + 1),
                state: Mutex::new(ScopeState {
                    collection,
                    resolved,
                    children: Vec::new(),
                    callbacks: Vec::new(),
                    next_callback: 0,
                    disposed: false,
                    pending: HashMap::new(),
                }),
            }),
        };

        debug!(
            scope = %scope,
            depth = scope.inner.depth,
            registered = scope.inner.state.lock().collection.len(),
            "Created scope"
        );
        scope
    }

    pub(crate) fn upgrade(inner: &Weak<ScopeInner>) -> Option<Scope> {
        inner.upgrade().map(|inner| Scope { inner })
    }

    // ── Reads ──

    /// Resolves the single registration of `identifier`.
    ///
    /// ```rust,ignore
    /// let db = scope.get(&database)?.downcast::<Database>()?;
    /// ```
    pub fn get(&self, identifier: &Identifier) -> Result<Instance> {
        self.get_with(identifier, Query::default())?
            .into_one()
            .ok_or_else(|| self.not_found(identifier))
    }

    /// Resolves `identifier` with explicit cardinality, lookup and freshness.
    pub fn get_with(&self, identifier: &Identifier, query: impl Into<Query>) -> Result<Resolved> {
        let resolved = self.resolve(identifier, query.into())?;

        if resolved.iter().any(Slot::is_pending) {
            return Err(ContainerError::AsyncFromSync {
                identifier: identifier.name().to_string(),
            });
        }

        Ok(resolved.map(Slot::into_instance))
    }

    /// Zero or one registration.
    pub fn get_optional(&self, identifier: &Identifier) -> Result<Option<Instance>> {
        Ok(self.get_with(identifier, Cardinality::Optional)?.into_one())
    }

    /// Every registration, in registration order.
    pub fn get_many(&self, identifier: &Identifier) -> Result<Vec<Instance>> {
        Ok(self.get_with(identifier, Cardinality::Many)?.into_vec())
    }

    /// [`get`](Scope::get) followed by a downcast.
    pub fn get_as<T: std::any::Any + Send + Sync>(&self, identifier: &Identifier) -> Result<Arc<T>> {
        self.get(identifier)?.downcast::<T>()
    }

    /// Like [`get`](Scope::get), but waits for async registrations.
    pub async fn get_async(&self, identifier: &Identifier) -> Result<Instance> {
        let slot = self
            .resolve(identifier, Query::default())?
            .into_one()
            .ok_or_else(|| self.not_found(identifier))?;

        match slot {
            Slot::Ready(instance) => Ok(instance),
            Slot::Pending(hook) => hook.when_ready().await,
        }
    }

    /// `true` if this scope or an ancestor registers `identifier`,
    /// resolved or not.
    pub fn has(&self, identifier: &Identifier) -> Result<bool> {
        self.ensure_alive()?;
        Ok(self.knows_upward(identifier))
    }

    // ── Mutations ──

    /// Appends a registration.
    ///
    /// # Errors
    /// [`ContainerError::MutationAfterResolution`] once `identifier` has a
    /// resolved value in this scope.
    pub fn add(&self, identifier: &Identifier, item: impl Into<DependencyItem>) -> Result<()> {
        let item = item.into();
        let mut state = self.lock_unresolved(identifier, Mutation::Add)?;

        debug!(scope = %self, identifier = %identifier, kind = item.kind(), "Added dependency");
        state.collection.add(identifier.clone(), item);
        Ok(())
    }

    /// Registers `producer` under its own identifier.
    pub fn add_class(&self, producer: &Producer) -> Result<()> {
        self.add(producer.identifier(), DependencyItem::class(producer.clone()))
    }

    /// Puts a built instance straight into the resolved registry.
    ///
    /// The scope owns it from now on and disposes it with itself.
    pub fn add_instance(&self, identifier: &Identifier, instance: Instance) -> Result<()> {
        let mut state = self.lock_alive()?;

        debug!(scope = %self, identifier = %identifier, "Added resolved instance");
        state.resolved.add(identifier.clone(), instance, true);
        Ok(())
    }

    /// Deletes every registration of `identifier`, then adds `item`.
    pub fn replace(&self, identifier: &Identifier, item: impl Into<DependencyItem>) -> Result<()> {
        let item = item.into();
        let mut state = self.lock_unresolved(identifier, Mutation::Replace)?;

        debug!(scope = %self, identifier = %identifier, kind = item.kind(), "Replaced dependency");
        state.collection.delete(identifier);
        state.pending.retain(|(pending, _), _| pending != identifier);
        state.collection.add(identifier.clone(), item);
        Ok(())
    }

    /// Deletes every registration of `identifier`.
    pub fn delete(&self, identifier: &Identifier) -> Result<()> {
        let mut state = self.lock_unresolved(identifier, Mutation::Delete)?;

        state.collection.delete(identifier);
        state.pending.retain(|(pending, _), _| pending != identifier);
        Ok(())
    }

    // ── Hierarchy ──

    /// Runs `callback` with a read-only view of this scope.
    pub fn invoke<R>(&self, callback: impl FnOnce(&Accessor<'_>) -> R) -> Result<R> {
        self.ensure_alive()?;
        Ok(callback(&Accessor { scope: self }))
    }

    /// Creates a child scope owning `items`.
    pub fn create_child(&self, items: Vec<(Identifier, DependencyItem)>) -> Result<Scope> {
        items
            .into_iter()
            .fold(Scope::builder(), |builder, (identifier, item)| builder.with(&identifier, item))
            .build_child(self)
    }

    /// Constructs `producer` once, without caching.
    ///
    /// `custom_args` fill the leading parameters; a count that does not
    /// match the first declared dependency is padded or truncated with a
    /// warning.
    pub fn create_instance(&self, producer: &Producer, custom_args: Vec<Instance>) -> Result<Instance> {
        self.ensure_alive()?;
        let _frame = Frame::enter(producer.name());
        self.instantiate_class(producer, custom_args, None)
    }

    /// Registers a teardown callback, run after the scope is disposed.
    ///
    /// Disposing the returned handle deregisters the callback.
    pub fn on_dispose(&self, callback: impl FnOnce() + Send + 'static) -> Result<DisposeHandle> {
        let mut state = self.lock_alive()?;

        let id = state.next_callback;
        state.next_callback += 1;
        state.callbacks.push((id, Box::new(callback)));

        Ok(DisposeHandle {
            scope: Arc::downgrade(&self.inner),
            id,
        })
    }

    /// Disposes children (post-order), then owned instances, detaches from
    /// the parent and finally runs teardown callbacks.
    ///
    /// # Errors
    /// [`ContainerError::ScopeDisposed`] if already disposed.
    pub fn dispose(&self) -> Result<()> {
        self.ensure_alive()?;
        self.dispose_tree();
        Ok(())
    }

    pub fn parent(&self) -> Option<Scope> {
        self.inner.parent.as_ref().and_then(Scope::upgrade)
    }

    pub fn children(&self) -> Vec<Scope> {
        self.inner.state.lock().children.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.config.name.as_deref()
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Distance from the root scope.
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.inner.config
    }

    // ═══════════════════════════════════════════
    // Resolution engine
    // ═══════════════════════════════════════════

    fn resolve(&self, identifier: &Identifier, query: Query) -> Result<Resolved<Slot>> {
        self.ensure_alive()?;
        self.check_depth(identifier)?;
        trace!(scope = %self, identifier = %identifier, ?query, "Resolving");

        if !query.fresh {
            if let Some(cached) = self.lookup_cached(identifier, query.cardinality, query.lookup)? {
                return Ok(cached);
            }
        }

        self.create(identifier, query)
    }

    /// Pure read. `None` means a registration exists but was not
    /// instantiated yet.
    fn lookup_cached(
        &self,
        identifier: &Identifier,
        cardinality: Cardinality,
        lookup: Option<Lookup>,
    ) -> Result<Option<Resolved<Slot>>> {
        if lookup == Some(Lookup::SkipSelf) {
            return self.lookup_in_parent(identifier, cardinality);
        }

        if identifier.is_scope() {
            let this = Slot::Ready(Instance::new(self.clone()));
            return Ok(Some(match cardinality {
                Cardinality::Required => Resolved::One(this),
                Cardinality::Optional => Resolved::Optional(Some(this)),
                Cardinality::Many => Resolved::Many(vec![this]),
            }));
        }

        if lookup == Some(Lookup::SelfOnly) || self.knows(identifier) {
            return self.lookup_local(identifier, cardinality);
        }

        self.lookup_in_parent(identifier, cardinality)
    }

    fn lookup_local(&self, identifier: &Identifier, cardinality: Cardinality) -> Result<Option<Resolved<Slot>>> {
        {
            let state = self.inner.state.lock();
            if state.resolved.has(identifier) {
                return state
                    .resolved
                    .get(identifier, cardinality)
                    .map(|resolved| Some(resolved.map(Slot::Ready)));
            }
            if state.collection.has(identifier) {
                return Ok(None);
            }
        }

        self.absent(identifier, cardinality).map(Some)
    }

    fn lookup_in_parent(&self, identifier: &Identifier, cardinality: Cardinality) -> Result<Option<Resolved<Slot>>> {
        match self.parent() {
            Some(parent) => parent.lookup_cached(identifier, cardinality, None),
            None => self.absent(identifier, cardinality).map(Some),
        }
    }

    /// Result for an identifier nobody registers.
    fn absent(&self, identifier: &Identifier, cardinality: Cardinality) -> Result<Resolved<Slot>> {
        match cardinality {
            Cardinality::Optional => Ok(Resolved::Optional(None)),
            Cardinality::Many => Ok(Resolved::Many(Vec::new())),
            Cardinality::Required => Err(self.not_found(identifier)),
        }
    }

    fn create(&self, identifier: &Identifier, query: Query) -> Result<Resolved<Slot>> {
        match self.owner_of(identifier, query.lookup) {
            Some(owner) => owner.produce(identifier, query),
            None => self.absent(identifier, query.cardinality),
        }
    }

    /// The scope whose registration answers `identifier` under `lookup`.
    fn owner_of(&self, identifier: &Identifier, lookup: Option<Lookup>) -> Option<Scope> {
        match lookup {
            Some(Lookup::SkipSelf) => self.parent()?.owner_of(identifier, None),
            Some(Lookup::SelfOnly) => self.knows(identifier).then(|| self.clone()),
            None if self.knows(identifier) => Some(self.clone()),
            None => self.parent()?.owner_of(identifier, None),
        }
    }

    fn produce(&self, identifier: &Identifier, query: Query) -> Result<Resolved<Slot>> {
        let items = self
            .inner
            .state
            .lock()
            .collection
            .get(identifier, query.cardinality)?;

        if query.fresh {
            trace!(scope = %self, identifier = %identifier, "Producing fresh value");
            let slots = items
                .iter()
                .map(|item| self.resolve_item(identifier, item))
                .collect::<Result<Vec<_>>>()?;
            return shape(identifier, query.cardinality, slots);
        }

        match self.instantiate_batch(identifier)? {
            Some(slots) => shape(identifier, query.cardinality, slots),
            None => self
                .inner
                .state
                .lock()
                .resolved
                .get(identifier, query.cardinality)
                .map(|resolved| resolved.map(Slot::Ready)),
        }
    }

    /// Instantiates everything `identifier` needs, roots first.
    ///
    /// Returns the requested node's slots, or `None` if something else
    /// cached it in the meantime.
    #[instrument(skip_all, fields(scope = %self, identifier = %identifier))]
    fn instantiate_batch(&self, identifier: &Identifier) -> Result<Option<Vec<Slot>>> {
        let requested: NodeKey = (self.inner.id, identifier.clone());
        let mut graph = self.walk(identifier)?;
        debug!(nodes = graph.len(), "Instantiating dependency batch");

        let mut result = None;
        while !graph.is_empty() {
            let roots = graph.roots();

            if roots.is_empty() {
                let chain: Vec<String> = graph
                    .find_cycle(&requested)
                    .unwrap_or_default()
                    .iter()
                    .map(|(_, node)| node.name().to_string())
                    .collect();

                warn!(cycle = ?chain, "Circular dependency detected!");
                return Err(ContainerError::CircularDependency(CircularDependencyError {
                    chain,
                    exact: true,
                }));
            }

            for key in roots {
                let Some(owner) = graph.data(&key).cloned() else {
                    continue;
                };

                let slots = owner.instantiate_node(&key.1)?;
                if key == requested {
                    result = slots;
                }
                graph.remove_node(&key);
            }
        }

        Ok(result)
    }

    /// Collects every node reachable from `(self, identifier)`.
    fn walk(&self, identifier: &Identifier) -> Result<ResolutionGraph<NodeKey, Scope>> {
        let mut graph = ResolutionGraph::new();
        graph.insert_node((self.inner.id, identifier.clone()), self.clone());

        let mut queue = VecDeque::from([(self.clone(), identifier.clone())]);
        while let Some((owner, node)) = queue.pop_front() {
            let items = {
                let state = owner.inner.state.lock();
                if state.resolved.has(&node) {
                    continue;
                }
                state.collection.items(&node)
            };

            let from: NodeKey = (owner.inner.id, node.clone());
            for item in items.iter().filter(|item| !item.is_async()) {
                let dependent = dependent_name(&node, item);

                for descriptor in item.dependencies() {
                    if descriptor.fresh {
                        continue;
                    }

                    let dependency = descriptor.identifier(&dependent)?;
                    if dependency.is_scope() {
                        continue;
                    }

                    // Unregistered parameters are reported by the constructor.
                    let Some(dependency_owner) = owner.owner_of(&dependency, descriptor.lookup) else {
                        continue;
                    };

                    let to: NodeKey = (dependency_owner.inner.id, dependency.clone());
                    if graph.insert_node(to.clone(), dependency_owner.clone()) {
                        queue.push_back((dependency_owner, dependency));
                    }
                    graph.insert_edge(&from, to);
                }
            }
        }

        Ok(graph)
    }

    /// Resolves every registration of `identifier` and caches the results,
    /// unless something cached it first.
    fn instantiate_node(&self, identifier: &Identifier) -> Result<Option<Vec<Slot>>> {
        let items = {
            let state = self.inner.state.lock();
            if state.resolved.has(identifier) {
                return Ok(None);
            }
            state.collection.items(identifier)
        };

        let mut slots = Vec::with_capacity(items.len());
        for item in &items {
            slots.push(self.resolve_item(identifier, item)?);
        }

        // Async registrations are cached by their hook once loaded.
        if slots.iter().any(Slot::is_pending) {
            return Ok(Some(slots));
        }

        let mut state = self.inner.state.lock();
        if state.resolved.has(identifier) {
            trace!(identifier = %identifier, "Already resolved by a side effect, skipping");
            return Ok(None);
        }

        for (item, slot) in items.iter().zip(&slots) {
            if let Slot::Ready(instance) = slot {
                let owned = !matches!(item, DependencyItem::Existing(_));
                state.resolved.add(identifier.clone(), instance.clone(), owned);
            }
        }

        Ok(Some(slots))
    }

    pub(crate) fn resolve_item(&self, identifier: &Identifier, item: &DependencyItem) -> Result<Slot> {
        let _frame = Frame::enter(identifier.name());
        self.check_depth(identifier)?;

        match item {
            DependencyItem::Value(instance) => Ok(Slot::Ready(instance.clone())),
            DependencyItem::Class(class) => self.resolve_class(class).map(Slot::Ready),
            DependencyItem::Factory(factory) => self.resolve_factory(identifier, factory).map(Slot::Ready),
            DependencyItem::Existing(target) => self.get(target).map(Slot::Ready),
            DependencyItem::Async(item) => Ok(Slot::Pending(self.async_hook(identifier, item))),
        }
    }

    /// Fails once this thread nests more resolutions than the config allows.
    fn check_depth(&self, identifier: &Identifier) -> Result<()> {
        if trail::depth() <= self.inner.config.max_resolution_depth {
            return Ok(());
        }

        let chain = trail::snapshot();
        warn!(identifier = %identifier, depth = chain.len(), "Resolution depth exceeded");
        Err(ContainerError::CircularDependency(CircularDependencyError {
            chain,
            exact: false,
        }))
    }

    fn resolve_class(&self, class: &ClassItem) -> Result<Instance> {
        if !class.lazy {
            return self.instantiate_class(&class.producer, Vec::new(), class.on_instantiation.as_ref());
        }

        trace!(producer = class.producer.name(), "Deferring lazy construction");
        let scope = Arc::downgrade(&self.inner);
        let class = class.clone();
        let idle = IdleValue::new(move || {
            let scope = Scope::upgrade(&scope).ok_or(ContainerError::ScopeDisposed)?;
            scope.ensure_alive()?;
            scope.instantiate_class(&class.producer, Vec::new(), class.on_instantiation.as_ref())
        });

        Ok(Instance::lazy(idle))
    }

    pub(crate) fn instantiate_class(
        &self,
        producer: &Producer,
        custom_args: Vec<Instance>,
        hook: Option<&InstantiationHook>,
    ) -> Result<Instance> {
        let name = producer.name();
        let declared = producer.declared_dependencies();

        let mut resolved = Vec::with_capacity(declared.len());
        for descriptor in &declared {
            resolved.push(self.resolve_parameter(name, descriptor)?);
        }

        let first_dependency = declared.first().map_or(custom_args.len(), |d| d.param_index);
        let mut args: Vec<Arg> = custom_args.into_iter().map(Arg::Value).collect();
        if args.len() != first_dependency {
            warn!(
                producer = name,
                "Expected {} custom parameter(s) of \"{}\" but got {}",
                first_dependency,
                name,
                args.len()
            );
            args.resize_with(first_dependency, || Arg::Absent);
        }
        args.extend(resolved);

        let instance = producer.construct(&Args::new(name, args))?;
        if let Some(hook) = hook {
            hook(&instance)?;
        }

        trace!(producer = name, "Constructed instance");
        Ok(instance)
    }

    fn resolve_factory(&self, identifier: &Identifier, factory: &FactoryItem) -> Result<Instance> {
        let dependent = identifier.name();

        let mut args = Vec::with_capacity(factory.deps.len());
        for descriptor in &factory.deps {
            args.push(self.resolve_parameter(dependent, descriptor)?);
        }

        let instance = (factory.factory)(&Args::new(dependent, args))?;
        if let Some(hook) = &factory.on_instantiation {
            hook(&instance)?;
        }

        Ok(instance)
    }

    /// Resolves one declared parameter, naming the dependent if it is missing.
    fn resolve_parameter(&self, dependent: &str, descriptor: &Descriptor) -> Result<Arg> {
        let identifier = descriptor.identifier(dependent)?;

        let resolved = match self.resolve(&identifier, descriptor.query()) {
            Ok(resolved) => resolved,
            Err(ContainerError::NotFound(inner)) => {
                return Err(ContainerError::MissingParameter(MissingParameterError {
                    requested: identifier.name().to_string(),
                    index: descriptor.param_index,
                    dependent: dependent.to_string(),
                    stack: inner.stack,
                }));
            }
            Err(other) => return Err(other),
        };

        Ok(match resolved {
            Resolved::One(slot) => Arg::Value(slot.into_instance()),
            Resolved::Optional(slot) => Arg::Optional(slot.map(Slot::into_instance)),
            Resolved::Many(slots) => Arg::Many(slots.into_iter().map(Slot::into_instance).collect()),
        })
    }

    fn async_hook(&self, identifier: &Identifier, item: &AsyncItem) -> AsyncHook {
        let registration = Arc::as_ptr(&item.loader) as *const () as usize;
        let cell = {
            let mut state = self.inner.state.lock();
            Arc::clone(
                state
                    .pending
                    .entry((identifier.clone(), registration))
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        AsyncHook::new(Arc::downgrade(&self.inner), identifier.clone(), item.clone(), cell)
    }

    /// Caches an async result; the first writer wins.
    pub(crate) fn settle(&self, identifier: &Identifier, instance: Instance) -> Instance {
        let mut state = self.inner.state.lock();
        if let Some(existing) = state.resolved.first(identifier) {
            return existing;
        }
        if !state.disposed {
            state.resolved.add(identifier.clone(), instance.clone(), true);
        }
        instance
    }

    pub(crate) fn cached_first(&self, identifier: &Identifier) -> Option<Instance> {
        self.inner.state.lock().resolved.first(identifier)
    }

    // ── Internal ──

    pub(crate) fn ensure_alive(&self) -> Result<()> {
        self.lock_alive().map(drop)
    }

    fn lock_alive(&self) -> Result<MutexGuard<'_, ScopeState>> {
        let state = self.inner.state.lock();
        if state.disposed {
            return Err(ContainerError::ScopeDisposed);
        }
        Ok(state)
    }

    fn lock_unresolved(&self, identifier: &Identifier, operation: Mutation) -> Result<MutexGuard<'_, ScopeState>> {
        let state = self.lock_alive()?;
        if state.resolved.has(identifier) {
            return Err(ContainerError::MutationAfterResolution {
                identifier: identifier.name().to_string(),
                operation,
            });
        }
        Ok(state)
    }

    /// Registered or resolved locally.
    pub(crate) fn knows(&self, identifier: &Identifier) -> bool {
        let state = self.inner.state.lock();
        state.collection.has(identifier) || state.resolved.has(identifier)
    }

    fn knows_upward(&self, identifier: &Identifier) -> bool {
        self.knows(identifier) || self.parent().is_some_and(|parent| parent.knows_upward(identifier))
    }

    pub(crate) fn registered_identifiers(&self) -> Vec<Identifier> {
        self.inner.state.lock().collection.identifiers()
    }

    pub(crate) fn resolved_identifiers(&self) -> Vec<Identifier> {
        self.inner.state.lock().resolved.identifiers()
    }

    pub(crate) fn registered_items(&self, identifier: &Identifier) -> Vec<DependencyItem> {
        self.inner.state.lock().collection.items(identifier)
    }

    pub(crate) fn dependency_owner(&self, identifier: &Identifier, lookup: Option<Lookup>) -> Option<Scope> {
        self.owner_of(identifier, lookup)
    }

    fn not_found(&self, identifier: &Identifier) -> ContainerError {
        let mut known = Vec::new();
        let mut cursor = Some(self.clone());
        while let Some(scope) = cursor {
            known.extend(scope.registered_identifiers());
            known.extend(scope.resolved_identifiers());
            cursor = scope.parent();
        }

        let mut names: Vec<&str> = known.iter().map(Identifier::name).collect();
        names.sort_unstable();
        names.dedup();

        ContainerError::NotFound(NotFoundError {
            requested: identifier.name().to_string(),
            stack: trail::snapshot(),
            suggestions: suggest_similar(identifier.name(), &names, 3),
        })
    }

    fn adopt(&self, child: &Scope) -> Result<()> {
        let mut state = self.lock_alive()?;
        state.children.push(child.clone());
        Ok(())
    }

    fn dispose_tree(&self) {
        let children = std::mem::take(&mut self.inner.state.lock().children);
        for child in &children {
            child.dispose_tree();
        }

        let mut resolved = {
            let mut state = self.inner.state.lock();
            state.collection.clear();
            state.pending.clear();
            std::mem::take(&mut state.resolved)
        };
        resolved.dispose();

        if let Some(parent) = self.parent() {
            parent
                .inner
                .state
                .lock()
                .children
                .retain(|sibling| sibling.inner.id != self.inner.id);
        }

        let callbacks = {
            let mut state = self.inner.state.lock();
            state.disposed = true;
            std::mem::take(&mut state.callbacks)
        };
        for (_, callback) in callbacks {
            callback();
        }

        debug!(scope = %self, children = children.len(), "Disposed scope");
    }
}

fn dependent_name(identifier: &Identifier, item: &DependencyItem) -> String {
    match item {
        DependencyItem::Class(class) => class.producer.name().to_string(),
        _ => identifier.name().to_string(),
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner.config.name {
            Some(name) => f.write_str(name),
            None => write!(f, "scope#{}", self.inner.id),
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("name", &self.inner.config.name)
            .field("depth", &self.inner.depth)
            .finish()
    }
}

// ═══════════════════════════════════════════
// Accessor & DisposeHandle
// ═══════════════════════════════════════════

/// Read-only view of a scope, handed out by [`Scope::invoke`].
pub struct Accessor<'a> {
    scope: &'a Scope,
}

impl Accessor<'_> {
    pub fn get(&self, identifier: &Identifier) -> Result<Instance> {
        self.scope.get(identifier)
    }

    pub fn get_with(&self, identifier: &Identifier, query: impl Into<Query>) -> Result<Resolved> {
        self.scope.get_with(identifier, query)
    }

    pub fn get_optional(&self, identifier: &Identifier) -> Result<Option<Instance>> {
        self.scope.get_optional(identifier)
    }

    pub fn get_many(&self, identifier: &Identifier) -> Result<Vec<Instance>> {
        self.scope.get_many(identifier)
    }

    pub fn get_as<T: std::any::Any + Send + Sync>(&self, identifier: &Identifier) -> Result<Arc<T>> {
        self.scope.get_as(identifier)
    }

    pub fn has(&self, identifier: &Identifier) -> Result<bool> {
        self.scope.has(identifier)
    }
}

/// Returned by [`Scope::on_dispose`]; disposing it deregisters the callback.
#[derive(Debug)]
pub struct DisposeHandle {
    scope: Weak<ScopeInner>,
    id: u64,
}

impl Disposable for DisposeHandle {
    fn dispose(&self) {
        if let Some(inner) = self.scope.upgrade() {
            inner.state.lock().callbacks.retain(|(id, _)| *id != self.id);
        }
    }
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::{Accessor, DisposeHandle, Scope, ScopeBuilder};
    pub use crate::config::ScopeConfig;
    pub use crate::declaration::{Dep, declared_dependencies, set_declared_dependency, set_dependencies};
    pub use crate::error::{ContainerError, Result};
    pub use crate::hook::AsyncHook;
    pub use crate::identifier::{Identifier, IdentifierSlot, forward_ref};
    pub use crate::instance::{Disposable, Instance};
    pub use crate::item::{AsyncOutput, DependencyItem};
    pub use crate::modifier::{Cardinality, Lookup, Query, Resolved};
    pub use crate::producer::{Arg, Args, Injectable, Producer, Provider, ProviderRegistry};
    pub use crate::singletons::register_singleton;
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
