//! Type-erased resolved values.
//!
//! An [`Instance`] is what a scope hands out and caches. It is a shared,
//! type-erased value plus an optional disposer. A lazy instance is a
//! forwarding handle: the real value is built on first use.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use crate::error::{ContainerError, Result};
use crate::idle::IdleValue;

/// Something that releases resources when its scope is disposed.
pub trait Disposable: Send + Sync {
    fn dispose(&self);
}

#[derive(Clone)]
struct Ready {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    disposer: Option<Arc<dyn Disposable>>,
}

#[derive(Clone)]
enum Repr {
    Ready(Ready),
    Lazy(Arc<IdleValue<Instance>>),
}

/// A resolved value.
///
/// Cloning shares the underlying value; [`Instance::ptr_eq`] tells whether
/// two instances are the same value.
///
/// # Examples
/// ```
/// use warren_container::instance::Instance;
///
/// let instance = Instance::new(String::from("hello"));
/// let value = instance.downcast::<String>().unwrap();
/// assert_eq!(value.as_str(), "hello");
///
/// assert!(instance.downcast::<u32>().is_err());
/// ```
#[derive(Clone)]
pub struct Instance {
    repr: Repr,
}

impl Instance {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            repr: Repr::Ready(Ready {
                value,
                type_name: type_name::<T>(),
                disposer: None,
            }),
        }
    }

    /// Wraps a value whose [`Disposable::dispose`] runs when the owning
    /// scope is disposed.
    pub fn disposable<T: Disposable + Any>(value: T) -> Self {
        let value = Arc::new(value);
        Self {
            repr: Repr::Ready(Ready {
                value: Arc::clone(&value) as Arc<dyn Any + Send + Sync>,
                type_name: type_name::<T>(),
                disposer: Some(value as Arc<dyn Disposable>),
            }),
        }
    }

    /// A forwarding handle whose value comes from `idle` on first use.
    pub fn lazy(idle: Arc<IdleValue<Instance>>) -> Self {
        Self {
            repr: Repr::Lazy(idle),
        }
    }

    /// Downcasts to `T`, materialising a lazy instance first.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
        let ready = self.materialize()?;
        let Repr::Ready(ready) = ready.repr else {
            return Err(ContainerError::TypeMismatch {
                expected: type_name::<T>(),
                actual: "lazy instance",
            });
        };

        let actual = ready.type_name;
        ready.value.downcast::<T>().map_err(|_| ContainerError::TypeMismatch {
            expected: type_name::<T>(),
            actual,
        })
    }

    /// Returns the real instance, constructing a lazy one if needed.
    pub fn materialize(&self) -> Result<Instance> {
        match &self.repr {
            Repr::Ready(_) => Ok(self.clone()),
            Repr::Lazy(idle) => idle.get_value(),
        }
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self.repr, Repr::Lazy(_))
    }

    /// `false` only for a lazy instance whose value was not built yet.
    pub fn is_materialized(&self) -> bool {
        match &self.repr {
            Repr::Ready(_) => true,
            Repr::Lazy(idle) => idle.has_run(),
        }
    }

    /// Name of the wrapped type, `"lazy instance"` for a lazy handle.
    pub fn type_name(&self) -> &'static str {
        match &self.repr {
            Repr::Ready(ready) => ready.type_name,
            Repr::Lazy(_) => "lazy instance",
        }
    }

    pub fn ptr_eq(a: &Instance, b: &Instance) -> bool {
        a.identity() == b.identity()
    }

    pub(crate) fn identity(&self) -> usize {
        match &self.repr {
            Repr::Ready(ready) => Arc::as_ptr(&ready.value) as *const () as usize,
            Repr::Lazy(idle) => Arc::as_ptr(idle) as *const () as usize,
        }
    }

    /// Runs the disposer, if any.
    ///
    /// A lazy instance that was never built is cancelled instead, so its
    /// constructor never runs.
    pub fn dispose(&self) {
        match &self.repr {
            Repr::Ready(ready) => {
                if let Some(disposer) = &ready.disposer {
                    disposer.dispose();
                }
            }
            Repr::Lazy(idle) => {
                if idle.has_run() {
                    if let Ok(instance) = idle.get_value() {
                        instance.dispose();
                    }
                } else {
                    idle.dispose();
                }
            }
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Ready(ready) => f
                .debug_struct("Instance")
                .field("type", &ready.type_name)
                .field("disposable", &ready.disposer.is_some())
                .finish(),
            Repr::Lazy(idle) => f.debug_tuple("Instance::Lazy").field(idle).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Connection {
        closed: Arc<AtomicUsize>,
    }

    impl Disposable for Connection {
        fn dispose(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn clones_share_identity() {
        let a = Instance::new(5u32);
        let b = a.clone();
        let c = Instance::new(5u32);
        assert!(Instance::ptr_eq(&a, &b));
        assert!(!Instance::ptr_eq(&a, &c));
    }

    #[test]
    fn downcast_mismatch_names_types() {
        let instance = Instance::new(1u8);
        let err = instance.downcast::<String>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("String"));
        assert!(msg.contains("u8"));
    }

    #[test]
    fn disposable_instance_runs_disposer() {
        let closed = Arc::new(AtomicUsize::new(0));
        let instance = Instance::disposable(Connection { closed: Arc::clone(&closed) });

        assert!(instance.downcast::<Connection>().is_ok());
        instance.dispose();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lazy_instance_builds_on_first_downcast() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let instance = Instance::lazy(IdleValue::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Instance::new(String::from("late")))
        }));

        assert!(instance.is_lazy());
        assert!(!instance.is_materialized());
        assert_eq!(built.load(Ordering::SeqCst), 0);

        assert_eq!(instance.downcast::<String>().unwrap().as_str(), "late");
        assert_eq!(instance.downcast::<String>().unwrap().as_str(), "late");
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(instance.is_materialized());
    }

    #[test]
    fn disposing_unbuilt_lazy_instance_cancels_it() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let instance = Instance::lazy(IdleValue::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Instance::new(()))
        }));

        instance.dispose();
        assert!(instance.downcast::<()>().is_err());
        assert_eq!(built.load(Ordering::SeqCst), 0);
    }
}
