//! Process-global tables. Kept to a single test so nothing races the resets.

use warren::identifier::reset_identifiers;
use warren::prelude::*;
use warren::singletons::{reset_singletons, singleton_dependencies};

#[test]
fn resets_clear_global_tables() {
    let first = Identifier::new("isolation.token");
    assert_eq!(first, Identifier::new("isolation.token"));

    reset_identifiers();
    assert_ne!(first, Identifier::new("isolation.token"));

    let flag = Identifier::new("isolation.flag");
    register_singleton(&flag, DependencyItem::value(true)).unwrap();
    assert!(register_singleton(&flag, DependencyItem::value(false)).is_err());

    let root = Scope::builder().with_singletons().build();
    assert!(*root.get_as::<bool>(&flag).unwrap());

    reset_singletons();
    assert!(singleton_dependencies().is_empty());
    register_singleton(&flag, DependencyItem::value(false)).unwrap();
}
