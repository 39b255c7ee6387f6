/*! Dependency graph over classes, methods and fields.
 *
 * Nodes are addressed by table index, never by embedding, so classes that reference each other are
 * just a pair of edges. Edges come from the references recorded on each record when it was built;
 * building the graph resolves them against the class table once, in time linear in the number of
 * records and references.
 */

use crate::class_table::{ClassId, ClassTable};
use crate::codegen::runtime_contract;
use crate::method::{DependencyEdge, MethodKey};
use crate::instructions::InvokeKind;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Node {
    Class(ClassId),
    Method(ClassId, u32),
    Field(ClassId, u32),
}

impl Node {
    pub fn class(self) -> ClassId {
        match self {
            Node::Class(id) | Node::Method(id, _) | Node::Field(id, _) => id,
        }
    }

    pub fn label(self, table: &ClassTable) -> String {
        match self {
            Node::Class(id) => table.by_id(id).name.clone(),
            Node::Method(id, index) => table.by_id(id).methods[index as usize].qualified_name(),
            Node::Field(id, index) => {
                let class = table.by_id(id);
                format!("{}.{}", class.name, class.fields[index as usize].name)
            }
        }
    }
}

/// A virtual or interface invocation: the key dispatched on and the receiver's static type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub key: MethodKey,
    pub owner: String,
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.key)
    }
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<Node>,
    index: HashMap<Node, usize>,
    edges: Vec<Vec<usize>>,
    call_sites: Vec<Vec<CallSite>>,
    /// Virtual-eligible methods by dispatch key.
    virtuals: HashMap<MethodKey, Vec<usize>>,
    /// References to classes that are neither in the table nor provided by the runtime.
    unresolved: Vec<(usize, String)>,
}

impl DependencyGraph {
    pub fn build(table: &ClassTable) -> Self {
        let mut graph = DependencyGraph::default();
        for (id, class) in table.iter() {
            graph.add_node(Node::Class(id));
            for index in 0..class.methods.len() {
                graph.add_node(Node::Method(id, index as u32));
            }
            for index in 0..class.fields.len() {
                graph.add_node(Node::Field(id, index as u32));
            }
        }

        for (id, class) in table.iter() {
            let class_node = graph.index[&Node::Class(id)];
            for supertype in class.supertypes() {
                graph.link_class(table, class_node, supertype);
            }
            if let Some((clinit, _)) = class.static_initializer() {
                let target = graph.index[&Node::Method(id, clinit as u32)];
                graph.edges[class_node].push(target);
            }
            for (index, field) in class.fields.iter().enumerate() {
                let field_node = graph.index[&Node::Field(id, index as u32)];
                if !field.is_static() {
                    graph.edges[class_node].push(field_node);
                }
                graph.edges[field_node].push(class_node);
                for dependency in &field.dependencies {
                    graph.link_class(table, field_node, dependency);
                }
            }

            for (index, method) in class.methods.iter().enumerate() {
                let method_node = graph.index[&Node::Method(id, index as u32)];
                graph.edges[method_node].push(class_node);
                if method.is_virtual() {
                    graph
                        .virtuals
                        .entry(method.key())
                        .or_default()
                        .push(method_node);
                }
                for edge in &method.edges {
                    match edge {
                        DependencyEdge::Type(name) => graph.link_class(table, method_node, name),
                        DependencyEdge::Invoke { kind, target } => {
                            graph.link_class(table, method_node, &target.owner);
                            if let Some((owner, index)) =
                                table.resolve_method(&target.owner, &target.name, &target.descriptor)
                            {
                                let resolved = graph.index[&Node::Method(owner, index as u32)];
                                graph.edges[method_node].push(resolved);
                            }
                            if matches!(kind, InvokeKind::Virtual | InvokeKind::Interface) {
                                graph.call_sites[method_node].push(CallSite {
                                    key: MethodKey::from(target),
                                    owner: target.owner.clone(),
                                });
                            }
                            graph.add_implied_calls(method_node, &target.owner, &target.name, &target.descriptor);
                        }
                        DependencyEdge::Field { target, .. } => {
                            graph.link_class(table, method_node, &target.owner);
                            if let Some((owner, index)) = table.resolve_field(&target.owner, &target.name) {
                                let resolved = graph.index[&Node::Field(owner, index as u32)];
                                graph.edges[method_node].push(resolved);
                            }
                        }
                    }
                }
            }
        }
        graph
    }

    fn add_node(&mut self, node: Node) {
        self.index.insert(node, self.nodes.len());
        self.nodes.push(node);
        self.edges.push(Vec::new());
        self.call_sites.push(Vec::new());
    }

    fn link_class(&mut self, table: &ClassTable, from: usize, class: &str) {
        match table.id_of(class) {
            Some(id) => {
                let target = self.index[&Node::Class(id)];
                self.edges[from].push(target);
            }
            None if runtime_contract::is_runtime_class(class) => {}
            None => self.unresolved.push((from, class.to_string())),
        }
    }

    fn add_implied_calls(&mut self, from: usize, owner: &str, name: &str, descriptor: &str) {
        for ((class, method, desc), (implied_owner, implied_name, implied_desc)) in
            runtime_contract::IMPLIED_CALLS
        {
            if *class == owner && *method == name && *desc == descriptor {
                self.call_sites[from].push(CallSite {
                    key: MethodKey::new(implied_name, implied_desc),
                    owner: implied_owner.to_string(),
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> Node {
        self.nodes[index]
    }

    pub fn index_of(&self, node: Node) -> Option<usize> {
        self.index.get(&node).copied()
    }

    pub fn successors(&self, index: usize) -> &[usize] {
        &self.edges[index]
    }

    pub fn call_sites(&self, index: usize) -> &[CallSite] {
        &self.call_sites[index]
    }

    pub fn virtuals_for(&self, key: &MethodKey) -> &[usize] {
        self.virtuals.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(Vec::len).sum()
    }

    pub fn unresolved(&self) -> &[(usize, String)] {
        &self.unresolved
    }
}
