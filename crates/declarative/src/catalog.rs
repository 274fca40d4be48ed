//! Catalog construction and validation
//!
//! Resources are declared into a [`CatalogBuilder`], related to each other
//! through typed references, and frozen into an immutable [`Catalog`] by
//! [`CatalogBuilder::build`], which rejects unknown references and cycles and
//! computes the evaluation order.

use crate::error::{Error, Result};
use crate::graph::{Edge, Graph};
use crate::resource::Resource;
use crate::types::ResourceRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

/// Kind of a declared relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Source is applied before target
    Before,
    /// Target is applied before source
    Require,
    /// Like `Before`, and a change in source refreshes target
    Notify,
    /// Like `Require`, and a change in target refreshes source
    Subscribe,
}

impl RelationKind {
    pub fn is_refresh(&self) -> bool {
        matches!(self, Self::Notify | Self::Subscribe)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Before => "before",
            Self::Require => "require",
            Self::Notify => "notify",
            Self::Subscribe => "subscribe",
        };
        f.write_str(s)
    }
}

/// A relation as declared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub source: ResourceRef,
    pub kind: RelationKind,
    pub target: ResourceRef,
}

impl Relation {
    /// `(first, second, refresh)` in evaluation direction
    pub fn normalize(&self) -> (&ResourceRef, &ResourceRef, bool) {
        match self.kind {
            RelationKind::Before => (&self.source, &self.target, false),
            RelationKind::Require => (&self.target, &self.source, false),
            RelationKind::Notify => (&self.source, &self.target, true),
            RelationKind::Subscribe => (&self.target, &self.source, true),
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.source, self.kind, self.target)
    }
}

/// Mutable catalog under construction
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    resources: Vec<Resource>,
    index: HashMap<ResourceRef, usize>,
    relations: Vec<Relation>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a resource and get its reference.
    ///
    /// Re-declaring an identical resource returns the existing reference;
    /// re-declaring the same identity with other attributes is an error.
    pub fn declare(&mut self, resource: Resource) -> Result<ResourceRef> {
        let reference = resource.reference();
        if let Some(&existing) = self.index.get(&reference) {
            if self.resources[existing] == resource {
                log::trace!("{reference} declared again with identical attributes");
                return Ok(reference);
            }
            return Err(Error::DuplicateResource {
                resource: reference.to_string(),
            });
        }

        resource.validate()?;
        self.index.insert(reference.clone(), self.resources.len());
        self.resources.push(resource);
        Ok(reference)
    }

    /// Declare a barrier join node
    pub fn barrier(&mut self, title: impl Into<String>) -> Result<ResourceRef> {
        self.declare(Resource::barrier(title))
    }

    pub fn relate(
        &mut self,
        source: &ResourceRef,
        kind: RelationKind,
        target: &ResourceRef,
    ) -> &mut Self {
        self.relations.push(Relation {
            source: source.clone(),
            kind,
            target: target.clone(),
        });
        self
    }

    /// `a` is applied before `b`
    pub fn before(&mut self, a: &ResourceRef, b: &ResourceRef) -> &mut Self {
        self.relate(a, RelationKind::Before, b)
    }

    /// `a` requires `b`: `b` is applied first
    pub fn require(&mut self, a: &ResourceRef, b: &ResourceRef) -> &mut Self {
        self.relate(a, RelationKind::Require, b)
    }

    /// `a` is applied before `b` and refreshes it when changed
    pub fn notify(&mut self, a: &ResourceRef, b: &ResourceRef) -> &mut Self {
        self.relate(a, RelationKind::Notify, b)
    }

    /// `a` requires `b` and is refreshed when `b` changes
    pub fn subscribe(&mut self, a: &ResourceRef, b: &ResourceRef) -> &mut Self {
        self.relate(a, RelationKind::Subscribe, b)
    }

    pub fn get(&self, reference: &ResourceRef) -> Option<&Resource> {
        self.index.get(reference).map(|&i| &self.resources[i])
    }

    pub fn contains(&self, reference: &ResourceRef) -> bool {
        self.index.contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    fn lookup(&self, relation: &Relation, reference: &ResourceRef) -> Result<usize> {
        self.index.get(reference).copied().ok_or_else(|| {
            let referrer = if *reference == relation.source {
                &relation.target
            } else {
                &relation.source
            };
            Error::UnknownResource {
                referrer: referrer.to_string(),
                target: reference.to_string(),
            }
        })
    }

    /// Validate relations, reject cycles, compute the order, and freeze
    pub fn build(self) -> Result<Catalog> {
        let mut edges: Vec<Edge> = Vec::with_capacity(self.relations.len());
        let mut positions: HashMap<(usize, usize), usize> = HashMap::new();

        for relation in &self.relations {
            let (first, second, refresh) = relation.normalize();
            let from = self.lookup(relation, first)?;
            let to = self.lookup(relation, second)?;
            match positions.entry((from, to)) {
                Entry::Occupied(slot) => edges[*slot.get()].refresh |= refresh,
                Entry::Vacant(slot) => {
                    slot.insert(edges.len());
                    edges.push(Edge { from, to, refresh });
                }
            }
        }

        let graph = Graph::new(self.resources.len(), edges);
        let name = |i: usize| self.resources[i].reference().to_string();

        if let Some(cycle) = graph.find_cycle() {
            return Err(Error::CycleDetected {
                resources: cycle.into_iter().map(name).collect(),
            });
        }
        let order = graph.topological_order().ok_or_else(|| Error::CycleDetected {
            resources: Vec::new(),
        })?;

        log::debug!(
            "catalog built: {} resources, {} edges",
            self.resources.len(),
            graph.edges().count()
        );

        Ok(Catalog {
            resources: self.resources,
            relations: self.relations,
            index: self.index,
            graph,
            order,
        })
    }
}

/// Immutable, validated set of resources and their ordering
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    resources: Vec<Resource>,
    relations: Vec<Relation>,
    #[serde(skip)]
    index: HashMap<ResourceRef, usize>,
    #[serde(skip)]
    graph: Graph,
    #[serde(skip)]
    order: Vec<usize>,
}

impl Catalog {
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resources in declaration order
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn get(&self, reference: &ResourceRef) -> Option<&Resource> {
        self.index_of(reference).map(|i| &self.resources[i])
    }

    pub fn contains(&self, reference: &ResourceRef) -> bool {
        self.index.contains_key(reference)
    }

    pub fn index_of(&self, reference: &ResourceRef) -> Option<usize> {
        self.index.get(reference).copied()
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Declaration indices in evaluation order
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Resources in evaluation order
    pub fn ordered(&self) -> impl Iterator<Item = &Resource> {
        self.order.iter().map(|&i| &self.resources[i])
    }

    /// Relations declared with `reference` as source
    pub fn relations_of<'a>(
        &'a self,
        reference: &'a ResourceRef,
    ) -> impl Iterator<Item = &'a Relation> {
        self.relations.iter().filter(move |r| &r.source == reference)
    }

    /// Whether some path of edges leads from `a` to `b`
    pub fn precedes(&self, a: &ResourceRef, b: &ResourceRef) -> bool {
        let (Some(from), Some(to)) = (self.index_of(a), self.index_of(b)) else {
            return false;
        };
        let mut stack = vec![from];
        let mut seen = vec![false; self.len()];
        while let Some(node) = stack.pop() {
            for edge in self.graph.outgoing(node) {
                if edge.to == to {
                    return true;
                }
                if !seen[edge.to] {
                    seen[edge.to] = true;
                    stack.push(edge.to);
                }
            }
        }
        false
    }

    /// Render the graph in Graphviz DOT format; refresh edges are dashed
    pub fn to_dot(&self) -> String {
        let quote = |r: &Resource| format!("\"{}\"", r.to_string().replace('"', "\\\""));
        let mut out = String::from("digraph catalog {\n  rankdir=LR;\n  node [shape=box];\n");
        for resource in self.ordered() {
            out.push_str(&format!("  {};\n", quote(resource)));
        }
        for edge in self.graph.edges() {
            let style = if edge.refresh { " [style=dashed]" } else { "" };
            out.push_str(&format!(
                "  {} -> {}{};\n",
                quote(&self.resources[edge.from]),
                quote(&self.resources[edge.to]),
                style
            ));
        }
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ExecAttrs, FileAttrs, PackageAttrs};
    use crate::types::ResourceKind;

    fn exec(title: &str) -> Resource {
        Resource::exec(title, ExecAttrs::new(format!("echo {title}")))
    }

    #[test]
    fn test_identical_redeclaration_is_idempotent() {
        let mut builder = CatalogBuilder::new();
        let a = builder
            .declare(Resource::file("/etc/dirsrv", FileAttrs::directory()))
            .unwrap();
        let b = builder
            .declare(Resource::file("/etc/dirsrv", FileAttrs::directory()))
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_conflicting_redeclaration_fails() {
        let mut builder = CatalogBuilder::new();
        builder
            .declare(Resource::file("/etc/dirsrv", FileAttrs::directory()))
            .unwrap();
        let err = builder
            .declare(Resource::file("/etc/dirsrv", FileAttrs::file()))
            .unwrap_err();
        assert!(
            matches!(err, Error::DuplicateResource { ref resource } if resource == "File[/etc/dirsrv]")
        );
    }

    #[test]
    fn test_same_title_different_kind_is_distinct() {
        let mut builder = CatalogBuilder::new();
        builder.declare(exec("dirsrv")).unwrap();
        builder
            .declare(Resource::package("dirsrv", PackageAttrs::installed()))
            .unwrap();
        assert_eq!(builder.len(), 2);
    }

    #[test]
    fn test_require_and_subscribe_normalize() {
        let mut builder = CatalogBuilder::new();
        let pkg = builder
            .declare(Resource::package("389-ds-base", PackageAttrs::installed()))
            .unwrap();
        let dir = builder
            .declare(Resource::file("/etc/dirsrv", FileAttrs::directory()))
            .unwrap();
        let rehash = builder.declare(exec("rehash")).unwrap();
        builder.require(&pkg, &dir).subscribe(&rehash, &pkg);
        let catalog = builder.build().unwrap();

        let titles: Vec<_> = catalog.ordered().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["/etc/dirsrv", "389-ds-base", "rehash"]);
        let pkg_idx = catalog.index_of(&pkg).unwrap();
        let rehash_idx = catalog.index_of(&rehash).unwrap();
        assert_eq!(
            catalog.graph().refresh_targets(pkg_idx).collect::<Vec<_>>(),
            vec![rehash_idx]
        );
        assert!(catalog.precedes(&dir, &rehash));
    }

    #[test]
    fn test_duplicate_edges_merge_refresh() {
        let mut builder = CatalogBuilder::new();
        let a = builder.declare(exec("a")).unwrap();
        let b = builder.declare(exec("b")).unwrap();
        builder.before(&a, &b).notify(&a, &b);
        let catalog = builder.build().unwrap();
        let edges: Vec<_> = catalog.graph().edges().collect();
        assert_eq!(edges.len(), 1);
        assert!(edges[0].refresh);
    }

    #[test]
    fn test_cycle_names_participants() {
        let mut builder = CatalogBuilder::new();
        let a = builder.declare(exec("a")).unwrap();
        let b = builder.declare(exec("b")).unwrap();
        let c = builder.declare(exec("c")).unwrap();
        builder.before(&a, &b).before(&b, &c).require(&a, &c);
        match builder.build().unwrap_err() {
            Error::CycleDetected { resources } => {
                assert_eq!(resources, vec!["Exec[a]", "Exec[b]", "Exec[c]"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_deep_require_chain_builds() {
        let mut builder = CatalogBuilder::new();
        let mut previous = builder.declare(exec("step 0")).unwrap();
        for n in 1..20_000 {
            let next = builder.declare(exec(&format!("step {n}"))).unwrap();
            builder.require(&next, &previous);
            previous = next;
        }
        let catalog = builder.build().unwrap();
        assert_eq!(catalog.len(), 20_000);
        assert_eq!(catalog.ordered().last().unwrap().reference(), previous);
    }

    #[test]
    fn test_self_relation_is_a_cycle() {
        let mut builder = CatalogBuilder::new();
        let a = builder.declare(exec("a")).unwrap();
        builder.notify(&a, &a);
        assert!(matches!(
            builder.build().unwrap_err(),
            Error::CycleDetected { resources } if resources == vec!["Exec[a]"]
        ));
    }

    #[test]
    fn test_unknown_reference_rejected() {
        let mut builder = CatalogBuilder::new();
        let a = builder.declare(exec("a")).unwrap();
        let ghost = ResourceRef::new(ResourceKind::Service, "dirsrv@foo");
        builder.require(&a, &ghost);
        match builder.build().unwrap_err() {
            Error::UnknownResource { referrer, target } => {
                assert_eq!(referrer, "Exec[a]");
                assert_eq!(target, "Service[dirsrv@foo]");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_dot_output() {
        let mut builder = CatalogBuilder::new();
        let a = builder.declare(exec("a")).unwrap();
        let b = builder.declare(exec("b")).unwrap();
        builder.notify(&a, &b);
        let dot = builder.build().unwrap().to_dot();
        assert!(dot.contains("\"Exec[a]\" -> \"Exec[b]\" [style=dashed];"));
    }
}
