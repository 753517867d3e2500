//! Error types for Warren container operations.
//!
//! Every message names the identifier by its human-readable name and,
//! where it helps, carries the resolution stack and a hint.

use std::fmt;
use std::sync::Arc;

use warren_support::rendering::{ordinal, render_chain};

use crate::modifier::Cardinality;

/// Main error type for all Warren operations.
///
/// Errors are `Clone` so memoised failures (see [`IdleValue`](crate::idle::IdleValue))
/// can be replayed on every access.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ContainerError {
    /// Nothing is registered for a required identifier.
    #[error("{}", .0)]
    NotFound(NotFoundError),

    /// A producer parameter could not be found.
    #[error("{}", .0)]
    MissingParameter(MissingParameterError),

    /// The number of registrations does not match the requested cardinality.
    #[error("{}", .0)]
    QuantityMismatch(QuantityMismatchError),

    /// Circular dependency detected during resolution.
    #[error("{}", .0)]
    CircularDependency(CircularDependencyError),

    /// Tried to add, replace or delete a registration that was already resolved.
    #[error("Cannot {operation} dependency \"{identifier}\" after it is already resolved.")]
    MutationAfterResolution { identifier: String, operation: Mutation },

    /// The scope was used after `dispose()`.
    #[error("Scope cannot be accessed after it was disposed.")]
    ScopeDisposed,

    /// An async registration was requested through the sync api.
    #[error("Cannot get async item \"{identifier}\" from sync api. Use get_async instead.")]
    AsyncFromSync { identifier: String },

    /// An async loader produced another async item.
    #[error("Async item \"{identifier}\" returns another async item.")]
    NestedAsync { identifier: String },

    /// A producer or factory returned an error.
    #[error("Failed to construct \"{identifier}\": {source}")]
    ConstructionFailed {
        identifier: String,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// An instance was downcast to the wrong type.
    #[error("Type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// A producer read a parameter with the wrong shape.
    #[error("The {} parameter of \"{producer}\" is not {expected}", ordinal(*.index))]
    BadArgument {
        producer: String,
        index: usize,
        expected: &'static str,
    },

    /// A declaration used an identifier that is not initialised yet.
    #[error(
        "The {} parameter of \"{producer}\" is declared with \"{identifier}\" which is not initialised yet.\n  Hint: Initialise the identifier before declaring, or use forward_ref"
        , ordinal(*.index)
    )]
    IdentifierUndefined {
        producer: String,
        index: usize,
        identifier: String,
    },

    /// A modifier targeted a parameter with no declared dependency.
    #[error("Could not find dependency registered on the {index} (indexed) parameter of \"{producer}\".")]
    DescriptorNotFound { producer: String, index: usize },

    /// The same identifier was registered twice as a global singleton.
    #[error("Duplicated singleton registration of \"{identifier}\".")]
    DuplicateSingleton { identifier: String },

    /// A deferred value was disposed before it ever ran.
    #[error("Deferred value was cancelled before it ran.")]
    DeferredCancelled,
}

impl ContainerError {
    /// Wraps a producer failure, for use inside constructors and factories.
    ///
    /// ```
    /// use warren_container::error::ContainerError;
    ///
    /// let err = ContainerError::construction_failed("database", std::io::Error::other("refused"));
    /// assert!(err.to_string().contains("database"));
    /// ```
    pub fn construction_failed(
        identifier: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ContainerError::ConstructionFailed {
            identifier: identifier.into(),
            source: Arc::new(source),
        }
    }

    /// Returns `true` for a not-found signal, direct or translated.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ContainerError::NotFound(_) | ContainerError::MissingParameter(_)
        )
    }
}

/// Kind of registry mutation, used by [`ContainerError::MutationAfterResolution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Add,
    Replace,
    Delete,
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutation::Add => write!(f, "add"),
            Mutation::Replace => write!(f, "replace"),
            Mutation::Delete => write!(f, "delete"),
        }
    }
}

/// Error when a required dependency has no registration.
///
/// Includes the resolution stack and "did you mean?" suggestions.
#[derive(Debug, Clone)]
pub struct NotFoundError {
    /// The identifier that was requested
    pub requested: String,
    /// Identifiers being resolved when the lookup failed, outermost first
    pub stack: Vec<String>,
    /// Similar identifiers that ARE registered
    pub suggestions: Vec<String>,
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cannot find \"{}\" registered by any scope. Expected 1 dependency item(s) but got 0. Did you forget to register it?",
            self.requested
        )?;

        if !self.stack.is_empty() {
            write!(f, "\n  Resolution stack: {}", render_chain(&self.stack))?;
        }

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        Ok(())
    }
}

/// Error when a producer's declared parameter cannot be found.
#[derive(Debug, Clone)]
pub struct MissingParameterError {
    /// The identifier that was missing
    pub requested: String,
    /// Zero-based parameter index on the dependent
    pub index: usize,
    /// The producer or factory that declared the parameter
    pub dependent: String,
    /// Resolution stack of the inner not-found signal
    pub stack: Vec<String>,
}

impl fmt::Display for MissingParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cannot find \"{}\" registered by any scope. It is the {} parameter of \"{}\".",
            self.requested,
            ordinal(self.index),
            self.dependent,
        )?;

        if !self.stack.is_empty() {
            write!(f, "\n  Resolution stack: {}", render_chain(&self.stack))?;
        }

        Ok(())
    }
}

/// Error when the number of registrations violates the requested cardinality.
#[derive(Debug, Clone)]
pub struct QuantityMismatchError {
    pub requested: String,
    pub cardinality: Cardinality,
    pub actual: usize,
}

impl fmt::Display for QuantityMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Expected {} dependency item(s) for \"{}\" but got {}.",
            self.cardinality.expectation(),
            self.requested,
            self.actual,
        )?;

        if self.actual == 0 {
            write!(f, " Did you forget to register it?")?;
        }

        if self.actual > 1 {
            write!(f, " It was registered more than once.")?;
        }

        Ok(())
    }
}

/// Error when a circular dependency is detected.
///
/// `exact` chains come from the resolution graph and start and end at the
/// requested identifier. Approximate ones come from the depth bound and
/// only name the identifier being resolved when it tripped.
#[derive(Debug, Clone)]
pub struct CircularDependencyError {
    pub chain: Vec<String>,
    pub exact: bool,
}

impl fmt::Display for CircularDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exact {
            write!(f, "Circular dependency detected:\n  {}", render_chain(&self.chain))?;
        } else {
            let last = self.chain.last().map(String::as_str).unwrap_or("<unknown>");
            write!(
                f,
                "Detecting cyclic dependency. The last identifier is \"{last}\"."
            )?;
        }

        write!(
            f,
            "\n  Hint: Consider using a lazy class item or restructuring your dependencies"
        )
    }
}

/// Convenient Result type for Warren operations.
pub type Result<T> = std::result::Result<T, ContainerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_error_display() {
        let err = ContainerError::NotFound(NotFoundError {
            requested: "logger".into(),
            stack: vec!["service".into(), "logger".into()],
            suggestions: vec!["loggers".into()],
        });

        let msg = format!("{err}");
        assert!(msg.contains("Cannot find \"logger\""));
        assert!(msg.contains("Did you forget to register it?"));
        assert!(msg.contains("service → logger"));
        assert!(msg.contains("- loggers"));
    }

    #[test]
    fn missing_parameter_names_position() {
        let err = ContainerError::MissingParameter(MissingParameterError {
            requested: "database".into(),
            index: 1,
            dependent: "UserRepo".into(),
            stack: vec![],
        });

        let msg = format!("{err}");
        assert!(msg.contains("It is the 2nd parameter of \"UserRepo\""));
        assert!(err.is_not_found());
    }

    #[test]
    fn quantity_mismatch_differentiates_excess() {
        let err = QuantityMismatchError {
            requested: "handler".into(),
            cardinality: Cardinality::Optional,
            actual: 3,
        };

        let msg = err.to_string();
        assert!(msg.contains("0 or 1"));
        assert!(msg.contains("registered more than once"));
        assert!(!msg.contains("forget"));
    }

    #[test]
    fn circular_dependency_error_display() {
        let err = ContainerError::CircularDependency(CircularDependencyError {
            chain: vec!["a".into(), "b".into(), "a".into()],
            exact: true,
        });

        let msg = format!("{err}");
        assert!(msg.contains("Circular"));
        assert!(msg.contains("a → b → a"));
    }

    #[test]
    fn mutation_error_names_operation() {
        let err = ContainerError::MutationAfterResolution {
            identifier: "config".into(),
            operation: Mutation::Delete,
        };
        assert_eq!(
            err.to_string(),
            "Cannot delete dependency \"config\" after it is already resolved."
        );
    }

    #[test]
    fn construction_failure_keeps_source() {
        use std::error::Error;

        let err = ContainerError::construction_failed("db", std::io::Error::other("refused"));
        assert!(err.source().is_some());
        let cloned = err.clone();
        assert!(cloned.to_string().contains("refused"));
    }
}
