//! Process-wide singleton registrations.
//!
//! Libraries register their singletons at startup; the application root
//! installs them once with [`ScopeBuilder::with_singletons`](crate::container::ScopeBuilder::with_singletons).

use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{ContainerError, Result};
use crate::identifier::Identifier;
use crate::item::DependencyItem;

static SINGLETONS: Lazy<Mutex<Vec<(Identifier, DependencyItem)>>> = Lazy::new(|| Mutex::new(Vec::new()));
static FETCHED: AtomicBool = AtomicBool::new(false);

/// Registers a singleton for every root scope built with singletons.
///
/// # Errors
/// [`ContainerError::DuplicateSingleton`] if `identifier` is already taken.
pub fn register_singleton(identifier: &Identifier, item: impl Into<DependencyItem>) -> Result<()> {
    let mut singletons = SINGLETONS.lock();
    if singletons.iter().any(|(known, _)| known == identifier) {
        return Err(ContainerError::DuplicateSingleton {
            identifier: identifier.name().to_string(),
        });
    }

    debug!(identifier = %identifier, "Registered singleton");
    singletons.push((identifier.clone(), item.into()));
    Ok(())
}

/// Every singleton registration, in registration order.
pub fn singleton_dependencies() -> Vec<(Identifier, DependencyItem)> {
    if FETCHED.swap(true, Ordering::SeqCst) {
        warn!("Singleton dependencies fetched more than once; only one root scope should own them");
    }
    SINGLETONS.lock().clone()
}

#[doc(hidden)]
pub fn reset_singletons() {
    SINGLETONS.lock().clear();
    FETCHED.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_is_rejected() {
        let clock = Identifier::new("singletons.tests.clock");
        register_singleton(&clock, DependencyItem::value(1u64)).unwrap();

        let err = register_singleton(&clock, DependencyItem::value(2u64)).unwrap_err();
        assert!(matches!(err, ContainerError::DuplicateSingleton { .. }));
    }

    #[test]
    fn registered_singletons_are_listed() {
        let cache = Identifier::new("singletons.tests.cache");
        register_singleton(&cache, DependencyItem::value("cache")).unwrap();

        assert!(singleton_dependencies().iter().any(|(id, _)| id == &cache));
    }
}
