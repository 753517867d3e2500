//! Core container implementation for Warren.

pub mod collection;
pub mod config;
pub mod container;
pub mod declaration;
pub mod error;
pub(crate) mod graph;
pub mod hook;
pub mod identifier;
pub mod idle;
pub mod instance;
pub mod item;
pub mod modifier;
pub mod producer;
pub mod singletons;
pub mod snapshot;
pub(crate) mod trail;

pub use container::{Accessor, DisposeHandle, Scope, ScopeBuilder, prelude};
pub use error::{ContainerError, Result};
pub use identifier::Identifier;
pub use instance::Instance;
pub use item::DependencyItem;
