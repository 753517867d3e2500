//! Producers: named constructors with declared dependencies.
//!
//! A [`Producer`] is what a class item constructs. It owns its
//! [`Descriptor`] list and a construct function that receives the resolved
//! parameters as [`Args`].
//!
//! Two front-ends build producers:
//! - [`Producer::new`] plus [`set_dependencies`](crate::declaration::set_dependencies)
//! - the [`Injectable`] trait, via [`Producer::of`]
//!
//! Related registrations can be grouped in a [`Provider`] module.
//!
//! # Examples
//! ```
//! use std::sync::Arc;
//! use warren_container::prelude::*;
//!
//! struct Greeter {
//!     name: Arc<String>,
//! }
//!
//! let name = Identifier::new("doc.producer.name");
//!
//! let greeter = Producer::new("Greeter", |args| {
//!     Ok(Instance::new(Greeter { name: args.required::<String>(0)? }))
//! });
//! set_dependencies(&greeter, vec![Dep::new(&name)], 0).unwrap();
//!
//! let scope = Scope::new(vec![(name.clone(), DependencyItem::value(String::from("warren")))]);
//! scope.add_class(&greeter).unwrap();
//!
//! let resolved = scope.get_as::<Greeter>(greeter.identifier()).unwrap();
//! assert_eq!(resolved.name.as_str(), "warren");
//! ```

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::trace;
use warren_support::rendering::shorten_type_name;

use crate::container::Scope;
use crate::declaration::{Dep, Descriptor, set_dependencies};
use crate::error::{ContainerError, Result};
use crate::hook::AsyncHook;
use crate::identifier::Identifier;
use crate::instance::Instance;
use crate::item::DependencyItem;

/// Construct function of a producer.
pub type ConstructFn = Arc<dyn Fn(&Args) -> Result<Instance> + Send + Sync>;

static TYPED: Lazy<DashMap<TypeId, Producer>> = Lazy::new(DashMap::new);

struct ProducerInner {
    name: String,
    identifier: Identifier,
    construct: ConstructFn,
    declarations: Mutex<Vec<Descriptor>>,
}

/// A named constructor with its own dependency declarations.
///
/// Cloning shares the producer; declarations made through any clone are
/// visible to all of them.
#[derive(Clone)]
pub struct Producer {
    inner: Arc<ProducerInner>,
}

impl Producer {
    pub fn new(
        name: impl Into<String>,
        construct: impl Fn(&Args) -> Result<Instance> + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        Self {
            inner: Arc::new(ProducerInner {
                identifier: Identifier::unique(name.clone()),
                name,
                construct: Arc::new(construct),
                declarations: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns the producer for `T`, created once per type.
    ///
    /// The declarations from [`Injectable::dependencies`] are applied the
    /// first time, starting after [`Injectable::custom_args`].
    pub fn of<T: Injectable>() -> Result<Producer> {
        let type_id = TypeId::of::<T>();
        if let Some(existing) = TYPED.get(&type_id) {
            return Ok(existing.value().clone());
        }

        let producer = Producer::new(shorten_type_name(type_name::<T>()), |args| {
            T::construct(args).map(Injectable::into_instance)
        });
        set_dependencies(&producer, T::dependencies(), T::custom_args())?;

        trace!(producer = %producer.name(), "Created typed producer");
        Ok(TYPED.entry(type_id).or_insert(producer).value().clone())
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The identifier a class registration of this producer lives under.
    pub fn identifier(&self) -> &Identifier {
        &self.inner.identifier
    }

    /// Appends the descriptor, or overwrites the one at the same index.
    pub fn declare(&self, descriptor: Descriptor) -> Result<()> {
        if descriptor.identifier.is_placeholder() {
            return Err(ContainerError::IdentifierUndefined {
                producer: self.name().to_string(),
                index: descriptor.param_index,
                identifier: descriptor.identifier.label(),
            });
        }

        let mut declarations = self.inner.declarations.lock();
        match declarations
            .iter_mut()
            .find(|existing| existing.param_index == descriptor.param_index)
        {
            Some(existing) => *existing = descriptor,
            None => declarations.push(descriptor),
        }

        Ok(())
    }

    /// Adjusts an already declared parameter, e.g. to make it optional.
    ///
    /// # Errors
    /// [`ContainerError::DescriptorNotFound`] when nothing is declared at
    /// `param_index`.
    pub fn modify_dependency(
        &self,
        param_index: usize,
        modify: impl FnOnce(&mut Descriptor),
    ) -> Result<()> {
        let mut declarations = self.inner.declarations.lock();
        let descriptor = declarations
            .iter_mut()
            .find(|existing| existing.param_index == param_index)
            .ok_or_else(|| ContainerError::DescriptorNotFound {
                producer: self.name().to_string(),
                index: param_index,
            })?;

        modify(descriptor);
        descriptor.param_index = param_index;
        Ok(())
    }

    /// Declarations sorted by parameter index.
    pub fn declared_dependencies(&self) -> Vec<Descriptor> {
        let mut declarations = self.inner.declarations.lock().clone();
        declarations.sort_by_key(|descriptor| descriptor.param_index);
        declarations
    }

    pub fn construct(&self, args: &Args) -> Result<Instance> {
        (self.inner.construct)(args)
    }

    pub fn ptr_eq(a: &Producer, b: &Producer) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("name", &self.inner.name)
            .field("declarations", &self.inner.declarations.lock().len())
            .finish()
    }
}

/// Typed front-end for producers.
///
/// ```
/// use warren_container::prelude::*;
///
/// struct Clock;
///
/// impl Injectable for Clock {
///     fn construct(_: &Args) -> Result<Self> {
///         Ok(Clock)
///     }
/// }
///
/// let clock = Producer::of::<Clock>().unwrap();
/// assert_eq!(clock.name(), "Clock");
/// assert!(Producer::ptr_eq(&clock, &Producer::of::<Clock>().unwrap()));
/// ```
pub trait Injectable: Any + Send + Sync + Sized {
    /// Injected parameters, in order.
    fn dependencies() -> Vec<Dep> {
        Vec::new()
    }

    /// Number of leading arguments supplied by `Scope::create_instance`.
    fn custom_args() -> usize {
        0
    }

    fn construct(args: &Args) -> Result<Self>;

    /// Override to register a disposer with [`Instance::disposable`].
    fn into_instance(self) -> Instance {
        Instance::new(self)
    }
}

/// One resolved parameter.
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Instance),
    Optional(Option<Instance>),
    Many(Vec<Instance>),
    /// Padding for a custom argument that was not supplied.
    Absent,
}

/// Parameters handed to a construct function, custom arguments first.
#[derive(Debug)]
pub struct Args {
    producer: String,
    values: Vec<Arg>,
}

impl Args {
    pub(crate) fn new(producer: impl Into<String>, values: Vec<Arg>) -> Self {
        Self {
            producer: producer.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arg> {
        self.values.get(index)
    }

    /// The single instance at `index`.
    pub fn instance(&self, index: usize) -> Result<Instance> {
        match self.values.get(index) {
            Some(Arg::Value(instance)) | Some(Arg::Optional(Some(instance))) => Ok(instance.clone()),
            _ => Err(self.bad_argument(index, "a single value")),
        }
    }

    pub fn required<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>> {
        self.instance(index)?.downcast::<T>()
    }

    pub fn optional<T: Any + Send + Sync>(&self, index: usize) -> Result<Option<Arc<T>>> {
        match self.values.get(index) {
            Some(Arg::Optional(value)) => value.as_ref().map(Instance::downcast::<T>).transpose(),
            Some(Arg::Value(instance)) => instance.downcast::<T>().map(Some),
            Some(Arg::Absent) => Ok(None),
            _ => Err(self.bad_argument(index, "an optional value")),
        }
    }

    pub fn many<T: Any + Send + Sync>(&self, index: usize) -> Result<Vec<Arc<T>>> {
        match self.values.get(index) {
            Some(Arg::Many(values)) => values.iter().map(Instance::downcast::<T>).collect(),
            Some(Arg::Value(instance)) => Ok(vec![instance.downcast::<T>()?]),
            Some(Arg::Absent) => Ok(Vec::new()),
            _ => Err(self.bad_argument(index, "a list of values")),
        }
    }

    /// The injected scope (see [`Identifier::scope`]).
    pub fn scope(&self, index: usize) -> Result<Scope> {
        self.required::<Scope>(index).map(|scope| Scope::clone(&scope))
    }

    /// The pending handle injected for an async registration.
    pub fn async_hook(&self, index: usize) -> Result<AsyncHook> {
        self.required::<AsyncHook>(index).map(|hook| AsyncHook::clone(&hook))
    }

    fn bad_argument(&self, index: usize, expected: &'static str) -> ContainerError {
        ContainerError::BadArgument {
            producer: self.producer.clone(),
            index,
            expected,
        }
    }
}

/// A module that registers related dependencies into a scope builder.
///
/// ```rust,ignore
/// struct StorageProvider;
///
/// impl Provider for StorageProvider {
///     fn register(&self, registry: &mut dyn ProviderRegistry) {
///         registry.register(Identifier::new("storage.root"), DependencyItem::value(PathBuf::from("/var/lib/app")));
///         registry.register_class(&disk_producer());
///     }
/// }
/// ```
pub trait Provider: Send + Sync {
    /// Called once while the scope is being built.
    fn register(&self, registry: &mut dyn ProviderRegistry);

    /// Human-readable name for logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// The registration surface providers see.
pub trait ProviderRegistry {
    fn register(&mut self, identifier: Identifier, item: DependencyItem);

    /// Registers an already built instance.
    fn register_instance(&mut self, identifier: Identifier, instance: Instance);

    /// Registers a producer under its own identifier.
    fn register_class(&mut self, producer: &Producer) {
        self.register(producer.identifier().clone(), DependencyItem::class(producer.clone()));
    }
}
