//! Per-scope registries.
//!
//! [`DependencyCollection`] holds the recipes registered in a scope,
//! [`ResolvedCollection`] the instances produced from them. Both keep
//! several entries per identifier in registration order and check reads
//! against the requested [`Cardinality`].

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::error::{ContainerError, NotFoundError, QuantityMismatchError, Result};
use crate::identifier::Identifier;
use crate::instance::Instance;
use crate::item::DependencyItem;
use crate::modifier::{Cardinality, Resolved};
use crate::trail;

/// Checks that `actual` registrations satisfy `cardinality`.
///
/// A missing required registration is reported as not found, every other
/// violation as a quantity mismatch.
pub fn check_cardinality(identifier: &Identifier, cardinality: Cardinality, actual: usize) -> Result<()> {
    if cardinality.accepts(actual) {
        return Ok(());
    }

    if actual == 0 {
        return Err(ContainerError::NotFound(NotFoundError {
            requested: identifier.name().to_string(),
            stack: trail::snapshot(),
            suggestions: Vec::new(),
        }));
    }

    Err(ContainerError::QuantityMismatch(QuantityMismatchError {
        requested: identifier.name().to_string(),
        cardinality,
        actual,
    }))
}

/// Shapes `values` by `cardinality` after checking their count.
pub fn shape<T>(identifier: &Identifier, cardinality: Cardinality, values: Vec<T>) -> Result<Resolved<T>> {
    check_cardinality(identifier, cardinality, values.len())?;
    let actual = values.len();
    Resolved::shape(cardinality, values).ok_or_else(|| {
        ContainerError::QuantityMismatch(QuantityMismatchError {
            requested: identifier.name().to_string(),
            cardinality,
            actual,
        })
    })
}

/// Unresolved registrations of a scope.
#[derive(Debug, Default)]
pub struct DependencyCollection {
    items: HashMap<Identifier, Vec<DependencyItem>>,
    order: Vec<Identifier>,
}

impl DependencyCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `item` to the registrations of `identifier`.
    pub fn add(&mut self, identifier: Identifier, item: DependencyItem) {
        trace!(identifier = %identifier, kind = item.kind(), "Registering item");

        if !self.items.contains_key(&identifier) {
            self.order.push(identifier.clone());
        }
        self.items.entry(identifier).or_default().push(item);
    }

    /// Removes every registration of `identifier`, returning how many there were.
    pub fn delete(&mut self, identifier: &Identifier) -> usize {
        self.order.retain(|known| known != identifier);
        let removed = self.items.remove(identifier).map_or(0, |items| items.len());
        if removed > 0 {
            debug!(identifier = %identifier, removed, "Deleted registrations");
        }
        removed
    }

    pub fn has(&self, identifier: &Identifier) -> bool {
        self.items.contains_key(identifier)
    }

    /// Registrations of `identifier`, checked against `cardinality`.
    pub fn get(&self, identifier: &Identifier, cardinality: Cardinality) -> Result<Vec<DependencyItem>> {
        let items = self.items(identifier);
        check_cardinality(identifier, cardinality, items.len())?;
        Ok(items)
    }

    /// Registrations of `identifier`, unchecked.
    pub fn items(&self, identifier: &Identifier) -> Vec<DependencyItem> {
        self.items.get(identifier).cloned().unwrap_or_default()
    }

    /// Registered identifiers in first-registration order.
    pub fn identifiers(&self) -> Vec<Identifier> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.order.clear();
    }
}

/// Resolved instances of a scope.
///
/// Only instances the scope produced itself are owned and disposed with
/// it; an alias of an ancestor's instance is cached but not owned.
#[derive(Debug, Default)]
pub struct ResolvedCollection {
    values: HashMap<Identifier, Vec<Instance>>,
    order: Vec<Identifier>,
    owned: Vec<Instance>,
}

impl ResolvedCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, identifier: Identifier, instance: Instance, owned: bool) {
        trace!(identifier = %identifier, owned, "Caching resolved instance");

        if owned {
            self.owned.push(instance.clone());
        }
        if !self.values.contains_key(&identifier) {
            self.order.push(identifier.clone());
        }
        self.values.entry(identifier).or_default().push(instance);
    }

    pub fn has(&self, identifier: &Identifier) -> bool {
        self.values.contains_key(identifier)
    }

    /// Cached instances of `identifier`, checked against `cardinality`.
    pub fn get(&self, identifier: &Identifier, cardinality: Cardinality) -> Result<Resolved> {
        let values = self.values.get(identifier).cloned().unwrap_or_default();
        shape(identifier, cardinality, values)
    }

    /// The first cached instance of `identifier`.
    pub fn first(&self, identifier: &Identifier) -> Option<Instance> {
        self.values.get(identifier).and_then(|values| values.first().cloned())
    }

    /// Resolved identifiers in first-resolution order.
    pub fn identifiers(&self) -> Vec<Identifier> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Disposes owned instances in insertion order, each one once, and
    /// empties the collection.
    pub fn dispose(&mut self) {
        let mut seen = HashSet::new();
        let owned = std::mem::take(&mut self.owned);

        for instance in owned {
            if seen.insert(instance.identity()) {
                instance.dispose();
            }
        }

        self.values.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Disposable;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn id(name: &str) -> Identifier {
        Identifier::new(format!("collection.tests.{name}"))
    }

    #[test]
    fn required_with_zero_is_not_found() {
        let collection = DependencyCollection::new();
        let err = collection.get(&id("none"), Cardinality::Required).unwrap_err();
        assert!(matches!(err, ContainerError::NotFound(_)));
        assert!(err.to_string().contains("Did you forget to register it?"));
    }

    #[test]
    fn required_with_two_is_quantity_mismatch() {
        let mut collection = DependencyCollection::new();
        let twice = id("twice");
        collection.add(twice.clone(), DependencyItem::value(1u8));
        collection.add(twice.clone(), DependencyItem::value(2u8));

        match collection.get(&twice, Cardinality::Required).unwrap_err() {
            ContainerError::QuantityMismatch(err) => {
                assert_eq!(err.actual, 2);
                assert_eq!(err.cardinality, Cardinality::Required);
                assert!(err.to_string().contains("registered more than once"));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(collection.get(&twice, Cardinality::Many).unwrap().len(), 2);
        assert!(collection.get(&twice, Cardinality::Optional).is_err());
    }

    #[test]
    fn optional_and_many_accept_zero() {
        let collection = DependencyCollection::new();
        assert!(collection.get(&id("opt"), Cardinality::Optional).unwrap().is_empty());
        assert!(collection.get(&id("many"), Cardinality::Many).unwrap().is_empty());
    }

    #[test]
    fn delete_clears_all_registrations() {
        let mut collection = DependencyCollection::new();
        let gone = id("gone");
        collection.add(gone.clone(), DependencyItem::value(1u8));
        collection.add(gone.clone(), DependencyItem::value(2u8));

        assert_eq!(collection.delete(&gone), 2);
        assert!(!collection.has(&gone));
        assert!(collection.identifiers().is_empty());
    }

    struct Tracked {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Disposable for Tracked {
        fn dispose(&self) {
            self.log.lock().push(self.name);
        }
    }

    #[test]
    fn dispose_in_insertion_order_once_each() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = Instance::disposable(Tracked { name: "first", log: Arc::clone(&log) });
        let second = Instance::disposable(Tracked { name: "second", log: Arc::clone(&log) });

        let mut resolved = ResolvedCollection::new();
        resolved.add(id("first"), first.clone(), true);
        resolved.add(id("second"), second, true);
        resolved.add(id("alias"), first, true);

        resolved.dispose();
        assert_eq!(*log.lock(), vec!["first", "second"]);
        assert!(resolved.is_empty());
    }

    #[test]
    fn borrowed_instances_are_not_disposed() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let borrowed = Instance::disposable(Tracked { name: "borrowed", log: Arc::clone(&log) });

        let mut resolved = ResolvedCollection::new();
        resolved.add(id("borrowed"), borrowed, false);
        resolved.dispose();

        assert!(log.lock().is_empty());
    }

    #[test]
    fn resolved_reads_follow_cardinality() {
        let mut resolved = ResolvedCollection::new();
        let handlers = id("handlers");
        resolved.add(handlers.clone(), Instance::new(1u8), true);
        resolved.add(handlers.clone(), Instance::new(2u8), true);

        let many = resolved.get(&handlers, Cardinality::Many).unwrap();
        let values: Vec<u8> = many.into_vec().iter().map(|i| *i.downcast::<u8>().unwrap()).collect();
        assert_eq!(values, vec![1, 2]);
        assert!(resolved.get(&handlers, Cardinality::Required).is_err());
    }
}
