//! Dependency items: registered recipes for producing a value.
//!
//! | variant    | produces                                               |
//! |------------|--------------------------------------------------------|
//! | `Value`    | the given instance                                     |
//! | `Class`    | a producer's construction, optionally lazy             |
//! | `Factory`  | a function call over declared dependencies             |
//! | `Existing` | whatever another identifier resolves to (an alias)     |
//! | `Async`    | the output of an async loader, only via `get_async`    |

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::declaration::{Dep, Descriptor, normalize_deps};
use crate::error::Result;
use crate::identifier::Identifier;
use crate::instance::Instance;
use crate::modifier::Cardinality;
use crate::producer::{Args, Producer};

/// Post-construction hook.
pub type InstantiationHook = Arc<dyn Fn(&Instance) -> Result<()> + Send + Sync>;

/// Factory function over resolved dependencies.
pub type FactoryFn = Arc<dyn Fn(&Args) -> Result<Instance> + Send + Sync>;

/// A registered recipe.
#[derive(Clone)]
pub enum DependencyItem {
    Value(Instance),
    Class(ClassItem),
    Factory(FactoryItem),
    Existing(Identifier),
    Async(AsyncItem),
}

#[derive(Clone)]
pub struct ClassItem {
    pub producer: Producer,
    /// Construct on first use instead of on resolution.
    pub lazy: bool,
    pub on_instantiation: Option<InstantiationHook>,
}

#[derive(Clone)]
pub struct FactoryItem {
    pub factory: FactoryFn,
    pub deps: Vec<Descriptor>,
    pub on_instantiation: Option<InstantiationHook>,
}

#[derive(Clone)]
pub struct AsyncItem {
    pub loader: Arc<dyn AsyncLoader>,
    /// Forwarded to the producer when the loader yields one.
    pub on_instantiation: Option<InstantiationHook>,
}

/// What an async loader may yield.
pub enum AsyncOutput {
    Value(Instance),
    /// Instantiated like a non-lazy class item.
    Producer(Producer),
    /// Resolved through the synchronous path. The identifier names the
    /// item in messages; the result is cached under the async identifier.
    Item(Identifier, DependencyItem),
}

/// Loads a value asynchronously.
///
/// Implemented for every `Fn() -> impl Future<Output = Result<AsyncOutput>>`.
#[async_trait]
pub trait AsyncLoader: Send + Sync {
    async fn load(&self) -> Result<AsyncOutput>;
}

#[async_trait]
impl<F, Fut> AsyncLoader for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<AsyncOutput>> + Send + 'static,
{
    async fn load(&self) -> Result<AsyncOutput> {
        (self)().await
    }
}

impl DependencyItem {
    pub fn value<T: std::any::Any + Send + Sync>(value: T) -> Self {
        DependencyItem::Value(Instance::new(value))
    }

    pub fn instance(instance: Instance) -> Self {
        DependencyItem::Value(instance)
    }

    pub fn class(producer: Producer) -> Self {
        DependencyItem::Class(ClassItem {
            producer,
            lazy: false,
            on_instantiation: None,
        })
    }

    /// A class item constructed on first use.
    pub fn lazy_class(producer: Producer) -> Self {
        DependencyItem::Class(ClassItem {
            producer,
            lazy: true,
            on_instantiation: None,
        })
    }

    /// A factory over `deps`, numbered from zero.
    ///
    /// ```
    /// use warren_container::prelude::*;
    ///
    /// let base = Identifier::new("doc.item.base");
    /// let doubled = DependencyItem::factory(vec![Dep::new(&base)], |args| {
    ///     Ok(Instance::new(*args.required::<u32>(0)? * 2))
    /// });
    /// assert_eq!(doubled.dependencies().len(), 1);
    /// ```
    pub fn factory(
        deps: Vec<Dep>,
        factory: impl Fn(&Args) -> Result<Instance> + Send + Sync + 'static,
    ) -> Self {
        DependencyItem::Factory(FactoryItem {
            factory: Arc::new(factory),
            deps: normalize_deps(deps, 0),
            on_instantiation: None,
        })
    }

    /// An alias of `identifier`.
    pub fn existing(identifier: &Identifier) -> Self {
        DependencyItem::Existing(identifier.clone())
    }

    pub fn async_loader(loader: impl AsyncLoader + 'static) -> Self {
        DependencyItem::Async(AsyncItem {
            loader: Arc::new(loader),
            on_instantiation: None,
        })
    }

    /// Attaches a post-construction hook. Ignored by value and alias items.
    pub fn on_instantiation(
        mut self,
        hook: impl Fn(&Instance) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        let hook: InstantiationHook = Arc::new(hook);
        match &mut self {
            DependencyItem::Class(item) => item.on_instantiation = Some(hook),
            DependencyItem::Factory(item) => item.on_instantiation = Some(hook),
            DependencyItem::Async(item) => item.on_instantiation = Some(hook),
            DependencyItem::Value(_) | DependencyItem::Existing(_) => {}
        }
        self
    }

    pub fn is_async(&self) -> bool {
        matches!(self, DependencyItem::Async(_))
    }

    /// Dependencies the item declares.
    ///
    /// An alias depends on its target; a lazy class declares nothing up
    /// front since its construction is deferred.
    pub fn dependencies(&self) -> Vec<Descriptor> {
        match self {
            DependencyItem::Class(item) if item.lazy => Vec::new(),
            DependencyItem::Class(item) => item.producer.declared_dependencies(),
            DependencyItem::Factory(item) => item.deps.clone(),
            DependencyItem::Existing(target) => vec![Descriptor {
                param_index: 0,
                identifier: target.into(),
                cardinality: Cardinality::Required,
                lookup: None,
                fresh: false,
            }],
            DependencyItem::Value(_) | DependencyItem::Async(_) => Vec::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DependencyItem::Value(_) => "value",
            DependencyItem::Class(item) if item.lazy => "lazy class",
            DependencyItem::Class(_) => "class",
            DependencyItem::Factory(_) => "factory",
            DependencyItem::Existing(_) => "existing",
            DependencyItem::Async(_) => "async",
        }
    }
}

impl From<Producer> for DependencyItem {
    fn from(producer: Producer) -> Self {
        DependencyItem::class(producer)
    }
}

impl From<&Producer> for DependencyItem {
    fn from(producer: &Producer) -> Self {
        DependencyItem::class(producer.clone())
    }
}

impl From<Instance> for DependencyItem {
    fn from(instance: Instance) -> Self {
        DependencyItem::Value(instance)
    }
}

impl fmt::Debug for DependencyItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyItem::Value(instance) => f.debug_tuple("Value").field(instance).finish(),
            DependencyItem::Class(item) => f
                .debug_struct("Class")
                .field("producer", &item.producer.name())
                .field("lazy", &item.lazy)
                .finish(),
            DependencyItem::Factory(item) => {
                f.debug_struct("Factory").field("deps", &item.deps.len()).finish()
            }
            DependencyItem::Existing(target) => f.debug_tuple("Existing").field(target).finish(),
            DependencyItem::Async(_) => f.write_str("Async"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::set_dependencies;

    #[test]
    fn bare_producer_normalises_to_class() {
        let producer = Producer::new("Plain", |_| Ok(Instance::new(())));
        let item: DependencyItem = producer.into();

        match item {
            DependencyItem::Class(class) => {
                assert!(!class.lazy);
                assert!(class.on_instantiation.is_none());
            }
            other => panic!("expected class item, got {other:?}"),
        }
    }

    #[test]
    fn alias_depends_on_target() {
        let target = Identifier::new("item.tests.target");
        let deps = DependencyItem::existing(&target).dependencies();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].identifier.resolve(), Some(target));
    }

    #[test]
    fn lazy_class_declares_nothing_up_front() {
        let dep = Identifier::new("item.tests.lazy.dep");
        let producer = Producer::new("Deferred", |_| Ok(Instance::new(())));
        set_dependencies(&producer, vec![Dep::new(&dep)], 0).unwrap();

        assert_eq!(DependencyItem::class(producer.clone()).dependencies().len(), 1);
        assert!(DependencyItem::lazy_class(producer).dependencies().is_empty());
    }

    #[test]
    fn hook_attaches_to_constructing_items() {
        let item = DependencyItem::factory(vec![], |_| Ok(Instance::new(1u8))).on_instantiation(|_| Ok(()));
        assert!(matches!(item, DependencyItem::Factory(FactoryItem { on_instantiation: Some(_), .. })));
    }

    #[tokio::test]
    async fn closure_is_an_async_loader() {
        let item = DependencyItem::async_loader(|| async {
            Ok::<_, crate::error::ContainerError>(AsyncOutput::Value(Instance::new(7u8)))
        });
        assert!(item.is_async());

        let DependencyItem::Async(async_item) = item else {
            panic!("expected async item");
        };
        match async_item.loader.load().await.unwrap() {
            AsyncOutput::Value(instance) => assert_eq!(*instance.downcast::<u8>().unwrap(), 7),
            _ => panic!("expected a value"),
        }
    }
}
