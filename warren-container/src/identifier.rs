//! Capability identifiers.
//!
//! An [`Identifier`] names something that can be requested from a scope.
//! Identifiers are unique by name: creating the same name twice returns the
//! cached token (with a warning), so two modules that agree on a name agree
//! on the identifier.
//!
//! Declarations may refer to identifiers that do not exist yet, either
//! through an [`IdentifierSlot`] (a late-initialised static) or a
//! [`ForwardRef`] (a thunk unwrapped right before use).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use once_cell::sync::{Lazy, OnceCell};
use tracing::{trace, warn};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

static KNOWN: Lazy<DashMap<String, Identifier>> = Lazy::new(DashMap::new);

static SCOPE: Lazy<Identifier> = Lazy::new(|| Identifier::unique("Scope"));

struct IdentifierInner {
    id: u64,
    name: String,
}

/// Opaque token naming a requested capability.
///
/// Cloning is cheap. Equality and hashing use the token's identity, never
/// its name, so [`Identifier::unique`] tokens never collide with interned
/// ones.
///
/// # Examples
/// ```
/// use warren_container::identifier::Identifier;
///
/// let logger = Identifier::new("doc.logger");
/// assert_eq!(logger.name(), "doc.logger");
///
/// // Same name, same token
/// assert_eq!(Identifier::new("doc.logger"), logger);
/// ```
#[derive(Clone)]
pub struct Identifier {
    inner: Arc<IdentifierInner>,
}

impl Identifier {
    /// Returns the token registered for `name`, creating it on first use.
    ///
    /// Re-creating a known name is allowed but logged as a warning, since
    /// it usually means two modules picked the same name by accident.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();

        match KNOWN.entry(name) {
            Entry::Occupied(existing) => {
                warn!(identifier = %existing.key(), "Identifier already exists, returning the cached one");
                existing.get().clone()
            }
            Entry::Vacant(slot) => {
                let identifier = Self::unique(slot.key().clone());
                trace!(identifier = %identifier, "Created identifier");
                slot.insert(identifier.clone());
                identifier
            }
        }
    }

    /// Mints a token that is not entered in the name table.
    ///
    /// Producers use this: their identity is the producer itself, and two
    /// producers sharing a type name must stay distinct.
    pub fn unique(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(IdentifierInner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
            }),
        }
    }

    /// The reserved identifier for self-injection.
    ///
    /// Requesting it from a scope yields that scope.
    pub fn scope() -> Self {
        SCOPE.clone()
    }

    /// Returns `true` for the self-injection identifier.
    #[inline]
    pub fn is_scope(&self) -> bool {
        self.inner.id == SCOPE.inner.id
    }

    /// Human-readable name, used in every error message.
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

/// Clears the name table.
///
/// Only meant for test isolation: tokens handed out before the reset stay
/// valid but no longer match new tokens created with the same name.
#[doc(hidden)]
pub fn reset_identifiers() {
    KNOWN.clear();
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({:?})", self.inner.name)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

/// A `static`-friendly cell for an identifier created later.
///
/// ```
/// use warren_container::identifier::IdentifierSlot;
///
/// static CACHE: IdentifierSlot = IdentifierSlot::new("doc.cache");
///
/// assert!(CACHE.get().is_none());
/// let cache = CACHE.init();
/// assert_eq!(CACHE.get(), Some(cache));
/// ```
pub struct IdentifierSlot {
    name: &'static str,
    cell: OnceCell<Identifier>,
}

impl IdentifierSlot {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            cell: OnceCell::new(),
        }
    }

    /// Returns the identifier if the slot was initialised.
    pub fn get(&self) -> Option<Identifier> {
        self.cell.get().cloned()
    }

    /// Initialises the slot (once) and returns its identifier.
    pub fn init(&self) -> Identifier {
        self.cell.get_or_init(|| Identifier::new(self.name)).clone()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for IdentifierSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifierSlot")
            .field("name", &self.name)
            .field("initialised", &self.cell.get().is_some())
            .finish()
    }
}

/// Deferred identifier, unwrapped immediately before use.
///
/// Lets two declarations refer to each other regardless of which one is
/// initialised first.
#[derive(Clone)]
pub struct ForwardRef(Arc<dyn Fn() -> Option<Identifier> + Send + Sync>);

impl ForwardRef {
    pub fn resolve(&self) -> Option<Identifier> {
        (self.0)()
    }
}

impl fmt::Debug for ForwardRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resolve() {
            Some(identifier) => write!(f, "ForwardRef({identifier})"),
            None => write!(f, "ForwardRef(<unresolved>)"),
        }
    }
}

/// Wraps a thunk into a [`ForwardRef`].
///
/// ```
/// use warren_container::identifier::{IdentifierSlot, forward_ref};
///
/// static LATER: IdentifierSlot = IdentifierSlot::new("doc.later");
///
/// let reference = forward_ref(|| LATER.get());
/// assert!(reference.resolve().is_none());
/// LATER.init();
/// assert!(reference.resolve().is_some());
/// ```
pub fn forward_ref(thunk: impl Fn() -> Option<Identifier> + Send + Sync + 'static) -> ForwardRef {
    ForwardRef(Arc::new(thunk))
}

/// Identifier as written in a declaration.
#[derive(Clone, Debug)]
pub enum DeclaredIdentifier {
    Direct(Identifier),
    Forward(ForwardRef),
    Slot(&'static IdentifierSlot),
}

impl DeclaredIdentifier {
    /// Unwraps the declaration into a concrete identifier, if available now.
    pub fn resolve(&self) -> Option<Identifier> {
        match self {
            DeclaredIdentifier::Direct(identifier) => Some(identifier.clone()),
            DeclaredIdentifier::Forward(reference) => reference.resolve(),
            DeclaredIdentifier::Slot(slot) => slot.get(),
        }
    }

    /// Name for messages, even when the identifier is not resolvable yet.
    pub fn label(&self) -> String {
        match self {
            DeclaredIdentifier::Direct(identifier) => identifier.name().to_string(),
            DeclaredIdentifier::Forward(reference) => reference
                .resolve()
                .map(|identifier| identifier.name().to_string())
                .unwrap_or_else(|| "<forward reference>".to_string()),
            DeclaredIdentifier::Slot(slot) => slot.name().to_string(),
        }
    }

    /// `true` when the declaration is an empty slot, i.e. the referenced
    /// identifier was never initialised.
    pub(crate) fn is_placeholder(&self) -> bool {
        matches!(self, DeclaredIdentifier::Slot(slot) if slot.get().is_none())
    }
}

impl From<Identifier> for DeclaredIdentifier {
    fn from(identifier: Identifier) -> Self {
        DeclaredIdentifier::Direct(identifier)
    }
}

impl From<&Identifier> for DeclaredIdentifier {
    fn from(identifier: &Identifier) -> Self {
        DeclaredIdentifier::Direct(identifier.clone())
    }
}

impl From<ForwardRef> for DeclaredIdentifier {
    fn from(reference: ForwardRef) -> Self {
        DeclaredIdentifier::Forward(reference)
    }
}

impl From<&'static IdentifierSlot> for DeclaredIdentifier {
    fn from(slot: &'static IdentifierSlot) -> Self {
        DeclaredIdentifier::Slot(slot)
    }
}
