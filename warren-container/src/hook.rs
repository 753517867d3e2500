//! Pending async resolutions.
//!
//! Resolving an async item yields an [`AsyncHook`] instead of a value. The
//! loader only starts when [`AsyncHook::when_ready`] is awaited, and every
//! hook for the same registration shares one cell, so concurrent callers
//! run the loader once and observe the same instance.

use std::fmt;
use std::sync::{Arc, Weak};

use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::container::{Scope, ScopeInner};
use crate::error::{ContainerError, Result};
use crate::identifier::Identifier;
use crate::instance::Instance;
use crate::item::{AsyncItem, AsyncOutput, DependencyItem};

/// An unfinished resolution result.
#[derive(Clone, Debug)]
pub(crate) enum Slot {
    Ready(Instance),
    Pending(AsyncHook),
}

impl Slot {
    pub fn is_pending(&self) -> bool {
        matches!(self, Slot::Pending(_))
    }

    /// Producers receive a pending slot as an instance wrapping the hook.
    pub fn into_instance(self) -> Instance {
        match self {
            Slot::Ready(instance) => instance,
            Slot::Pending(hook) => Instance::new(hook),
        }
    }
}

/// Handle to an async registration that has not been loaded yet.
#[derive(Clone)]
pub struct AsyncHook {
    scope: Weak<ScopeInner>,
    identifier: Identifier,
    item: AsyncItem,
    cell: Arc<OnceCell<Instance>>,
}

impl AsyncHook {
    pub(crate) fn new(
        scope: Weak<ScopeInner>,
        identifier: Identifier,
        item: AsyncItem,
        cell: Arc<OnceCell<Instance>>,
    ) -> Self {
        Self {
            scope,
            identifier,
            item,
            cell,
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// `true` once the loader finished successfully.
    pub fn is_ready(&self) -> bool {
        self.cell.initialized()
    }

    /// Runs the loader (once) and returns the resolved instance.
    ///
    /// A failed load is not memoised; the next call tries again.
    ///
    /// The scope keeps the first value cached for the identifier. When an
    /// identifier has several async registrations, every hook therefore
    /// yields the value of whichever loader settled first, even though each
    /// loader still runs.
    pub async fn when_ready(&self) -> Result<Instance> {
        self.cell.get_or_try_init(|| self.load()).await.cloned()
    }

    async fn load(&self) -> Result<Instance> {
        trace!(identifier = %self.identifier, "Running async loader");
        let output = self.item.loader.load().await?;

        let scope = Scope::upgrade(&self.scope).ok_or(ContainerError::ScopeDisposed)?;
        scope.ensure_alive()?;

        // Another path may have cached a value while the loader ran.
        if let Some(existing) = scope.cached_first(&self.identifier) {
            debug!(identifier = %self.identifier, "Async item already resolved, keeping first value");
            return Ok(existing);
        }

        let instance = match output {
            AsyncOutput::Value(instance) => instance,
            AsyncOutput::Producer(producer) => {
                scope.instantiate_class(&producer, Vec::new(), self.item.on_instantiation.as_ref())?
            }
            AsyncOutput::Item(_, DependencyItem::Async(_)) => {
                return Err(ContainerError::NestedAsync {
                    identifier: self.identifier.name().to_string(),
                });
            }
            AsyncOutput::Item(name, item) => match scope.resolve_item(&name, &item)? {
                Slot::Ready(instance) => instance,
                Slot::Pending(_) => {
                    return Err(ContainerError::NestedAsync {
                        identifier: self.identifier.name().to_string(),
                    });
                }
            },
        };

        Ok(scope.settle(&self.identifier, instance))
    }
}

impl fmt::Debug for AsyncHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncHook")
            .field("identifier", &self.identifier)
            .field("ready", &self.is_ready())
            .finish()
    }
}
