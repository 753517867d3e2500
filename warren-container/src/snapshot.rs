//! Serializable view of a scope tree, for debugging and tooling.

use serde::Serialize;
use warren_support::rendering::{TreeEntry, render_tree};

use crate::container::Scope;
use crate::error::Result;
use crate::identifier::Identifier;

/// One scope and, recursively, its children.
#[derive(Debug, Clone, Serialize)]
pub struct ScopeSnapshot {
    pub id: u64,
    pub name: Option<String>,
    pub parent_id: Option<u64>,
    pub depth: usize,
    /// Registered identifiers, sorted by name.
    pub registered: Vec<String>,
    /// Identifiers with a cached value, sorted by name.
    pub resolved: Vec<String>,
    /// Declared dependencies of registered items.
    pub edges: Vec<EdgeSnapshot>,
    pub children: Vec<ScopeSnapshot>,
}

/// `from` declares a dependency on `to`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct EdgeSnapshot {
    pub from: String,
    pub to: String,
    /// The dependency is answered by an ancestor.
    pub cross_scope: bool,
}

impl Scope {
    /// Captures this scope and its descendants.
    ///
    /// ```
    /// use warren_container::prelude::*;
    ///
    /// let root = Scope::builder().name("root").build();
    /// root.create_child(vec![]).unwrap();
    ///
    /// let snapshot = root.snapshot().unwrap();
    /// assert_eq!(snapshot.children.len(), 1);
    /// assert!(snapshot.render().starts_with("root"));
    /// ```
    pub fn snapshot(&self) -> Result<ScopeSnapshot> {
        self.ensure_alive()?;

        let registered = self.registered_identifiers();
        let mut edges = Vec::new();
        for identifier in &registered {
            for item in self.registered_items(identifier) {
                for descriptor in item.dependencies() {
                    let Ok(dependency) = descriptor.identifier(identifier.name()) else {
                        continue;
                    };
                    if dependency.is_scope() {
                        continue;
                    }

                    if let Some(owner) = self.dependency_owner(&dependency, descriptor.lookup) {
                        edges.push(EdgeSnapshot {
                            from: identifier.name().to_string(),
                            to: dependency.name().to_string(),
                            cross_scope: owner.id() != self.id(),
                        });
                    }
                }
            }
        }
        edges.sort();
        edges.dedup();

        let mut children = Vec::new();
        for child in self.children() {
            children.push(child.snapshot()?);
        }

        Ok(ScopeSnapshot {
            id: self.id(),
            name: self.name().map(str::to_string),
            parent_id: self.parent().map(|parent| parent.id()),
            depth: self.depth(),
            registered: sorted_names(&registered),
            resolved: sorted_names(&self.resolved_identifiers()),
            edges,
            children,
        })
    }
}

impl ScopeSnapshot {
    /// Indented tree, one scope per line.
    pub fn render(&self) -> String {
        let mut entries = Vec::new();
        self.collect_entries(0, &mut entries);
        render_tree(&entries)
    }

    fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("scope#{}", self.id),
        }
    }

    fn collect_entries(&self, depth: usize, entries: &mut Vec<TreeEntry>) {
        entries.push(TreeEntry {
            depth,
            label: self.label(),
            detail: Some(format!(
                "{} registered, {} resolved",
                self.registered.len(),
                self.resolved.len()
            )),
        });

        for child in &self.children {
            child.collect_entries(depth + 1, entries);
        }
    }
}

fn sorted_names(identifiers: &[Identifier]) -> Vec<String> {
    let mut names: Vec<String> = identifiers.iter().map(|id| id.name().to_string()).collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::Dep;
    use crate::instance::Instance;
    use crate::item::DependencyItem;

    #[test]
    fn captures_registrations_edges_and_children() {
        let config = Identifier::new("snapshot.config");
        let service = Identifier::new("snapshot.service");

        let root = Scope::builder()
            .name("root")
            .with(&config, DependencyItem::value(1u8))
            .build();
        let child = Scope::builder()
            .name("request")
            .with(&service, DependencyItem::factory(vec![Dep::new(&config)], |_| Ok(Instance::new(()))))
            .build_child(&root)
            .unwrap();
        child.get(&service).unwrap();

        let snapshot = root.snapshot().unwrap();
        assert_eq!(snapshot.registered, vec!["snapshot.config"]);
        assert_eq!(snapshot.resolved, vec!["snapshot.config"]);

        let request = &snapshot.children[0];
        assert_eq!(request.parent_id, Some(root.id()));
        assert_eq!(request.depth, 1);
        assert_eq!(
            request.edges,
            vec![EdgeSnapshot {
                from: "snapshot.service".into(),
                to: "snapshot.config".into(),
                cross_scope: true,
            }]
        );
    }

    #[test]
    fn serializes_to_json() {
        let root = Scope::builder().name("json").build();
        let json = serde_json::to_value(root.snapshot().unwrap()).unwrap();

        assert_eq!(json["name"], "json");
        assert_eq!(json["depth"], 0);
        assert!(json["children"].as_array().unwrap().is_empty());
    }

    #[test]
    fn renders_indented_tree() {
        let root = Scope::builder().name("app").build();
        Scope::builder().name("worker").build_child(&root).unwrap();

        let rendered = root.snapshot().unwrap().render();
        assert!(rendered.contains("app"));
        assert!(rendered.contains("worker"));
    }

    #[test]
    fn disposed_scope_has_no_snapshot() {
        let root = Scope::new(vec![]);
        root.dispose().unwrap();
        assert!(root.snapshot().is_err());
    }
}
