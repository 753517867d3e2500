//! Dependency declarations.
//!
//! Each [`Producer`] owns an ordered list of [`Descriptor`]s, one per
//! injected parameter. The functions here are the whole declaration
//! surface the resolver relies on; any front-end (builder calls, the
//! [`Injectable`](crate::producer::Injectable) trait, hand-written
//! registration) only has to produce descriptors.

use crate::error::{ContainerError, Result};
use crate::identifier::{DeclaredIdentifier, ForwardRef, Identifier, IdentifierSlot};
use crate::modifier::{Cardinality, Lookup, Query};
use crate::producer::Producer;

/// One declared parameter of a producer or factory.
#[derive(Debug, Clone)]
pub struct Descriptor {
    /// Position of the parameter, custom arguments included.
    pub param_index: usize,
    pub identifier: DeclaredIdentifier,
    pub cardinality: Cardinality,
    pub lookup: Option<Lookup>,
    pub fresh: bool,
}

impl Descriptor {
    /// Unwraps the declared identifier right before use.
    ///
    /// `dependent` names the producer for the error message.
    pub fn identifier(&self, dependent: &str) -> Result<Identifier> {
        self.identifier
            .resolve()
            .ok_or_else(|| ContainerError::IdentifierUndefined {
                producer: dependent.to_string(),
                index: self.param_index,
                identifier: self.identifier.label(),
            })
    }

    /// The request this descriptor makes.
    pub fn query(&self) -> Query {
        Query {
            cardinality: self.cardinality,
            lookup: self.lookup,
            fresh: self.fresh,
        }
    }
}

/// Builder for a single dependency, used by factories and
/// [`set_dependencies`].
///
/// ```
/// use warren_container::declaration::Dep;
/// use warren_container::identifier::Identifier;
/// use warren_container::modifier::{Cardinality, Lookup};
///
/// let handlers = Identifier::new("doc.dep.handlers");
/// let dep = Dep::new(&handlers).many().skip_self();
///
/// let descriptor = dep.at(2);
/// assert_eq!(descriptor.param_index, 2);
/// assert_eq!(descriptor.cardinality, Cardinality::Many);
/// assert_eq!(descriptor.lookup, Some(Lookup::SkipSelf));
/// ```
#[derive(Debug, Clone)]
pub struct Dep {
    identifier: DeclaredIdentifier,
    cardinality: Cardinality,
    lookup: Option<Lookup>,
    fresh: bool,
}

impl Dep {
    pub fn new(identifier: impl Into<DeclaredIdentifier>) -> Self {
        Self {
            identifier: identifier.into(),
            cardinality: Cardinality::Required,
            lookup: None,
            fresh: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.cardinality = Cardinality::Optional;
        self
    }

    pub fn many(mut self) -> Self {
        self.cardinality = Cardinality::Many;
        self
    }

    pub fn self_only(mut self) -> Self {
        self.lookup = Some(Lookup::SelfOnly);
        self
    }

    pub fn skip_self(mut self) -> Self {
        self.lookup = Some(Lookup::SkipSelf);
        self
    }

    /// Ask for a brand-new, uncached value on every injection.
    pub fn fresh(mut self) -> Self {
        self.fresh = true;
        self
    }

    /// Places the dependency at `param_index`.
    pub fn at(self, param_index: usize) -> Descriptor {
        Descriptor {
            param_index,
            identifier: self.identifier,
            cardinality: self.cardinality,
            lookup: self.lookup,
            fresh: self.fresh,
        }
    }
}

impl From<Identifier> for Dep {
    fn from(identifier: Identifier) -> Self {
        Dep::new(identifier)
    }
}

impl From<&Identifier> for Dep {
    fn from(identifier: &Identifier) -> Self {
        Dep::new(identifier)
    }
}

impl From<ForwardRef> for Dep {
    fn from(reference: ForwardRef) -> Self {
        Dep::new(reference)
    }
}

impl From<&'static IdentifierSlot> for Dep {
    fn from(slot: &'static IdentifierSlot) -> Self {
        Dep::new(slot)
    }
}

/// Turns a dependency list into descriptors numbered from `start_index`.
pub fn normalize_deps(deps: Vec<Dep>, start_index: usize) -> Vec<Descriptor> {
    deps.into_iter()
        .enumerate()
        .map(|(offset, dep)| dep.at(start_index + offset))
        .collect()
}

/// Declares (or re-declares) the dependency at `param_index` of `producer`.
///
/// # Errors
/// [`ContainerError::IdentifierUndefined`] when `identifier` is a slot
/// that was never initialised.
pub fn set_declared_dependency(
    producer: &Producer,
    identifier: impl Into<DeclaredIdentifier>,
    param_index: usize,
    cardinality: Cardinality,
    lookup: Option<Lookup>,
) -> Result<()> {
    producer.declare(Descriptor {
        param_index,
        identifier: identifier.into(),
        cardinality,
        lookup,
        fresh: false,
    })
}

/// The producer's own declarations, sorted by parameter index.
pub fn declared_dependencies(producer: &Producer) -> Vec<Descriptor> {
    producer.declared_dependencies()
}

/// Declares every dependency in `deps`, the first one at `start_index`.
///
/// `start_index` is the number of leading custom arguments the producer
/// expects from `Scope::create_instance`.
pub fn set_dependencies(producer: &Producer, deps: Vec<Dep>, start_index: usize) -> Result<()> {
    for descriptor in normalize_deps(deps, start_index) {
        producer.declare(descriptor)?;
    }
    Ok(())
}
