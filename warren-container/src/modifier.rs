//! Request modifiers: how many values, where to look, whether to cache.
//!
//! - [`Cardinality`] — exactly one, zero or one, or any number
//! - [`Lookup`] — local only, ancestors only, or (absent) local first
//! - [`Query`] — the three combined, accepted by `Scope::get_with`

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::instance::Instance;

/// Expected number of registrations for a request.
///
/// # Examples
/// ```
/// use warren_container::modifier::Cardinality;
///
/// assert!(Cardinality::Required.accepts(1));
/// assert!(!Cardinality::Required.accepts(2));
/// assert!(Cardinality::Optional.accepts(0));
/// assert!(Cardinality::Many.accepts(5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Cardinality {
    /// Exactly one registration.
    #[default]
    Required,
    /// Zero or one registration.
    Optional,
    /// Any number of registrations, in registration order.
    Many,
}

impl Cardinality {
    /// Returns `true` if `count` registrations satisfy this cardinality.
    #[inline]
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Cardinality::Required => count == 1,
            Cardinality::Optional => count <= 1,
            Cardinality::Many => true,
        }
    }

    /// Expected count as written in error messages.
    pub fn expectation(&self) -> &'static str {
        match self {
            Cardinality::Required => "1",
            Cardinality::Optional => "0 or 1",
            Cardinality::Many => "0 or more",
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::Required => write!(f, "Required"),
            Cardinality::Optional => write!(f, "Optional"),
            Cardinality::Many => write!(f, "Many"),
        }
    }
}

/// Restricts which scopes a request may be answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lookup {
    /// Only the requesting scope.
    SelfOnly,
    /// Only the ancestors of the requesting scope.
    SkipSelf,
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::SelfOnly => write!(f, "SelfOnly"),
            Lookup::SkipSelf => write!(f, "SkipSelf"),
        }
    }
}

/// A normalised request: cardinality, lookup and freshness.
///
/// Anything convertible into a `Query` is accepted where a request is
/// made, so the common shapes stay short:
///
/// ```
/// use warren_container::modifier::{Cardinality, Lookup, Query};
///
/// let q: Query = Cardinality::Many.into();
/// assert_eq!(q.cardinality, Cardinality::Many);
///
/// let q: Query = (Cardinality::Optional, Lookup::SkipSelf).into();
/// assert_eq!(q.lookup, Some(Lookup::SkipSelf));
///
/// let q = Query::new().optional().fresh();
/// assert!(q.fresh);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Query {
    pub cardinality: Cardinality,
    pub lookup: Option<Lookup>,
    /// Bypass caching: produce a new value and never store it.
    pub fresh: bool,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
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

    pub fn fresh(mut self) -> Self {
        self.fresh = true;
        self
    }
}

impl From<Cardinality> for Query {
    fn from(cardinality: Cardinality) -> Self {
        Self {
            cardinality,
            ..Self::default()
        }
    }
}

impl From<Lookup> for Query {
    fn from(lookup: Lookup) -> Self {
        Self {
            lookup: Some(lookup),
            ..Self::default()
        }
    }
}

impl From<(Cardinality, Lookup)> for Query {
    fn from((cardinality, lookup): (Cardinality, Lookup)) -> Self {
        Self {
            cardinality,
            lookup: Some(lookup),
            fresh: false,
        }
    }
}

/// Result of a request, shaped by its cardinality.
#[derive(Debug, Clone)]
pub enum Resolved<T = Instance> {
    One(T),
    Optional(Option<T>),
    Many(Vec<T>),
}

impl<T> Resolved<T> {
    /// Shapes `values` according to `cardinality`.
    ///
    /// The count must already satisfy the cardinality.
    pub(crate) fn shape(cardinality: Cardinality, mut values: Vec<T>) -> Option<Self> {
        match cardinality {
            Cardinality::Required if values.len() == 1 => values.pop().map(Resolved::One),
            Cardinality::Optional if values.len() <= 1 => Some(Resolved::Optional(values.pop())),
            Cardinality::Many => Some(Resolved::Many(values)),
            _ => None,
        }
    }

    /// The single value, if there is exactly one or the first of many.
    pub fn into_one(self) -> Option<T> {
        match self {
            Resolved::One(value) => Some(value),
            Resolved::Optional(value) => value,
            Resolved::Many(values) => values.into_iter().next(),
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Resolved::One(value) => vec![value],
            Resolved::Optional(value) => value.into_iter().collect(),
            Resolved::Many(values) => values,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Resolved::One(_) => 1,
            Resolved::Optional(value) => usize::from(value.is_some()),
            Resolved::Many(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let values: Vec<&T> = match self {
            Resolved::One(value) => vec![value],
            Resolved::Optional(value) => value.iter().collect(),
            Resolved::Many(values) => values.iter().collect(),
        };
        values.into_iter()
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Resolved<U> {
        match self {
            Resolved::One(value) => Resolved::One(f(value)),
            Resolved::Optional(value) => Resolved::Optional(value.map(f)),
            Resolved::Many(values) => Resolved::Many(values.into_iter().map(f).collect()),
        }
    }

    pub fn try_map<U>(self, mut f: impl FnMut(T) -> Result<U>) -> Result<Resolved<U>> {
        Ok(match self {
            Resolved::One(value) => Resolved::One(f(value)?),
            Resolved::Optional(value) => Resolved::Optional(value.map(f).transpose()?),
            Resolved::Many(values) => {
                Resolved::Many(values.into_iter().map(f).collect::<Result<Vec<_>>>()?)
            }
        })
    }
}

impl Resolved<Instance> {
    /// Downcasts every value to `T`.
    pub fn downcast<T: Any + Send + Sync>(self) -> Result<Resolved<Arc<T>>> {
        self.try_map(|instance| instance.downcast::<T>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardinality_accepts_counts() {
        assert!(!Cardinality::Required.accepts(0));
        assert!(Cardinality::Required.accepts(1));
        assert!(Cardinality::Optional.accepts(1));
        assert!(!Cardinality::Optional.accepts(2));
        assert!(Cardinality::Many.accepts(0));
    }

    #[test]
    fn default_query_is_required_local_first() {
        let q = Query::default();
        assert_eq!(q.cardinality, Cardinality::Required);
        assert_eq!(q.lookup, None);
        assert!(!q.fresh);
    }

    #[test]
    fn query_from_lookup_keeps_required() {
        let q: Query = Lookup::SelfOnly.into();
        assert_eq!(q.cardinality, Cardinality::Required);
        assert_eq!(q.lookup, Some(Lookup::SelfOnly));
    }

    #[test]
    fn shape_follows_cardinality() {
        assert!(matches!(
            Resolved::shape(Cardinality::Required, vec![1]),
            Some(Resolved::One(1))
        ));
        assert!(matches!(
            Resolved::shape(Cardinality::Optional, Vec::<i32>::new()),
            Some(Resolved::Optional(None))
        ));
        assert!(Resolved::shape(Cardinality::Required, vec![1, 2]).is_none());

        let many = Resolved::shape(Cardinality::Many, vec![1, 2, 3]);
        assert_eq!(many.map(Resolved::into_vec), Some(vec![1, 2, 3]));
    }

    #[test]
    fn resolved_len_and_map() {
        let resolved = Resolved::Many(vec![1, 2]).map(|v| v * 10);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved.iter().copied().collect::<Vec<_>>(), vec![10, 20]);
        assert!(Resolved::<i32>::Optional(None).is_empty());
    }
}
