//! # Warren — hierarchical dependency container for Rust
//!
//! Scopes form a tree. Each scope caches what it resolves, delegates
//! anything it does not register to its ancestors and disposes what it
//! owns when it goes away, children first.
//!
//! ```
//! use warren::prelude::*;
//!
//! let greeting = Identifier::new("doc.facade.greeting");
//! let root = Scope::new(vec![(greeting.clone(), DependencyItem::value("hello"))]);
//! let request = root.create_child(vec![]).unwrap();
//!
//! assert_eq!(*request.get_as::<&str>(&greeting).unwrap(), "hello");
//! root.dispose().unwrap();
//! assert!(request.is_disposed());
//! ```

pub use warren_container::*;
pub use warren_support::*;
