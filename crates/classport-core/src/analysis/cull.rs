/*! Reachability culling.
 *
 * A breadth-first mark over the dependency graph from the declared roots, followed by a sweep that
 * flags everything unmarked as eliminated. Virtual dispatch is handled conservatively: an
 * overriding method is live when its class is live and some live call site dispatches on the same
 * key through a supertype of that class. Exact receiver types are not tracked.
 */

use super::graph::{DependencyGraph, Node};
use crate::class_table::ClassTable;
use crate::codegen::mangle;
use crate::config::CullConfig;
use crate::method::MethodKey;
use crate::{Result, TranslateError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiveReason {
    EntryPoint,
    KeepClass,
    NativeReference,
    Referenced,
    /// Kept by a live virtual or interface call site, named here.
    Override(String),
}

impl fmt::Display for LiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiveReason::EntryPoint => write!(f, "entry point"),
            LiveReason::KeepClass => write!(f, "kept by manifest"),
            LiveReason::NativeReference => write!(f, "named by native source"),
            LiveReason::Referenced => write!(f, "referenced"),
            LiveReason::Override(site) => write!(f, "may be dispatched from {}", site),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CullReport {
    pub live_classes: Vec<String>,
    pub eliminated_classes: Vec<String>,
    pub live_methods: usize,
    pub eliminated_methods: usize,
    pub live_fields: usize,
    pub eliminated_fields: usize,
    /// Live, non-interface classes with no live subclass.
    pub effectively_final: BTreeSet<String>,
    /// `(referencing node, missing class)` pairs.
    pub unresolved: Vec<(String, String)>,
    pub graph_nodes: usize,
    pub graph_edges: usize,
    pub duration: Duration,
    reasons: HashMap<String, (LiveReason, Option<String>)>,
}

impl CullReport {
    pub fn is_live(&self, label: &str) -> bool {
        self.reasons.contains_key(label)
    }

    pub fn reason(&self, label: &str) -> Option<&LiveReason> {
        self.reasons.get(label).map(|(reason, _)| reason)
    }

    /// Every live node, by label.
    pub fn live_set(&self) -> BTreeSet<String> {
        self.reasons.keys().cloned().collect()
    }

    /// The chain of nodes through which `label` was first reached, ending at a root.
    pub fn explain(&self, label: &str) -> Option<Vec<String>> {
        let mut chain = Vec::new();
        let mut current = Some(label.to_string());
        while let Some(node) = current {
            let (reason, parent) = self.reasons.get(&node)?;
            chain.push(format!("{} ({})", node, reason));
            if chain.len() > self.reasons.len() {
                break;
            }
            current = parent.clone();
        }
        Some(chain)
    }
}

struct Marker<'g> {
    graph: &'g DependencyGraph,
    live: Vec<bool>,
    reasons: Vec<Option<(LiveReason, Option<usize>)>>,
    queue: VecDeque<usize>,
}

impl<'g> Marker<'g> {
    fn new(graph: &'g DependencyGraph) -> Self {
        Self {
            graph,
            live: vec![false; graph.len()],
            reasons: vec![None; graph.len()],
            queue: VecDeque::new(),
        }
    }

    fn mark(&mut self, index: usize, reason: LiveReason, parent: Option<usize>) {
        if !self.live[index] {
            self.live[index] = true;
            self.reasons[index] = Some((reason, parent));
            self.queue.push_back(index);
        }
    }

    fn mark_node(&mut self, node: Node, reason: LiveReason) {
        if let Some(index) = self.graph.index_of(node) {
            self.mark(index, reason, None);
        }
    }
}

pub fn cull(table: &mut ClassTable, config: &CullConfig) -> Result<CullReport> {
    let start = Instant::now();
    table.reset_liveness();
    for warning in table.resolve_hierarchy() {
        debug!(%warning, "hierarchy");
    }
    let graph = DependencyGraph::build(table);
    let mut marker = Marker::new(&graph);

    for (class, method, descriptor) in &config.entry_points {
        let id = table
            .id_of(class)
            .ok_or_else(|| TranslateError::ClassNotFound(class.clone()))?;
        let (index, _) = table
            .by_id(id)
            .find_method(method, descriptor)
            .ok_or_else(|| TranslateError::EntryPointNotFound {
                class: class.clone(),
                method: format!("{}{}", method, descriptor),
            })?;
        marker.mark_node(Node::Method(id, index as u32), LiveReason::EntryPoint);
    }

    for class in &config.keep_classes {
        match table.id_of(class) {
            Some(id) => {
                marker.mark_node(Node::Class(id), LiveReason::KeepClass);
                for index in 0..table.by_id(id).methods.len() {
                    marker.mark_node(Node::Method(id, index as u32), LiveReason::KeepClass);
                }
            }
            None => warn!(class = %class, "keep-class not found in input"),
        }
    }

    if !config.native_sources.is_empty() {
        let tokens: HashSet<&str> = config
            .native_sources
            .iter()
            .flat_map(|source| mangle::identifiers(&source.contents))
            .collect();
        for (id, class) in table.iter() {
            let mangled = mangle::class_name(&class.name);
            if tokens.contains(mangled.as_str())
                || tokens.contains(mangle::class_symbol(&class.name).as_str())
            {
                marker.mark_node(Node::Class(id), LiveReason::NativeReference);
            }
            for (index, method) in class.methods.iter().enumerate() {
                let symbol = mangle::method_symbol(&class.name, &method.name, &method.signature);
                if tokens.contains(symbol.as_str()) {
                    marker.mark_node(Node::Method(id, index as u32), LiveReason::NativeReference);
                }
            }
        }
    }

    // Owners of live virtual/interface call sites, by dispatch key.
    let mut live_sites: HashMap<MethodKey, Vec<String>> = HashMap::new();

    while let Some(current) = marker.queue.pop_front() {
        for &next in graph.successors(current) {
            marker.mark(next, LiveReason::Referenced, Some(current));
        }
        match graph.node(current) {
            Node::Class(id) => {
                let class = table.by_id(id);
                for (index, method) in class.methods.iter().enumerate() {
                    if !method.is_virtual() {
                        continue;
                    }
                    let Some(owners) = live_sites.get(&method.key()) else {
                        continue;
                    };
                    if let Some(owner) = owners.iter().find(|o| table.is_subtype(&class.name, o)) {
                        let site = format!("{}.{}", owner, method.key());
                        if let Some(target) = graph.index_of(Node::Method(id, index as u32)) {
                            marker.mark(target, LiveReason::Override(site), Some(current));
                        }
                    }
                }
            }
            Node::Method(..) => {
                for site in graph.call_sites(current) {
                    let owners = live_sites.entry(site.key.clone()).or_default();
                    if owners.contains(&site.owner) {
                        continue;
                    }
                    owners.push(site.owner.clone());
                    for &candidate in graph.virtuals_for(&site.key) {
                        let candidate_class = graph.node(candidate).class();
                        let class_live = graph
                            .index_of(Node::Class(candidate_class))
                            .map(|i| marker.live[i])
                            .unwrap_or(false);
                        if class_live
                            && table.is_subtype(&table.by_id(candidate_class).name, &site.owner)
                        {
                            marker.mark(
                                candidate,
                                LiveReason::Override(site.to_string()),
                                Some(current),
                            );
                        }
                    }
                }
            }
            Node::Field(..) => {}
        }
    }

    let mut report = CullReport {
        graph_nodes: graph.len(),
        graph_edges: graph.edge_count(),
        ..CullReport::default()
    };
    for (index, reason) in marker.reasons.iter().enumerate() {
        if let Some((reason, parent)) = reason {
            let label = graph.node(index).label(table);
            let parent = parent.map(|p| graph.node(p).label(table));
            report.reasons.insert(label, (reason.clone(), parent));
        }
    }
    for (from, class) in graph.unresolved() {
        if marker.live[*from] {
            report
                .unresolved
                .push((graph.node(*from).label(table), class.clone()));
        }
    }

    let live = &marker.live;
    let is_live = |node: Node| graph.index_of(node).map(|i| live[i]).unwrap_or(false);
    let ids: Vec<_> = table.iter().map(|(id, _)| id).collect();
    for id in ids {
        let class_live = is_live(Node::Class(id));
        let method_flags: Vec<bool> = (0..table.by_id(id).methods.len())
            .map(|i| is_live(Node::Method(id, i as u32)))
            .collect();
        let field_flags: Vec<bool> = (0..table.by_id(id).fields.len())
            .map(|i| is_live(Node::Field(id, i as u32)))
            .collect();
        let class = table.by_id_mut(id);
        class.eliminated = !class_live;
        if class_live {
            report.live_classes.push(class.name.clone());
        } else {
            report.eliminated_classes.push(class.name.clone());
        }
        for (method, live) in class.methods.iter_mut().zip(method_flags) {
            method.eliminated = !(live && class_live);
            if method.eliminated {
                report.eliminated_methods += 1;
            } else {
                report.live_methods += 1;
            }
        }
        for (field, live) in class.fields.iter_mut().zip(field_flags) {
            field.eliminated = !(live && class_live);
            if field.eliminated {
                report.eliminated_fields += 1;
            } else {
                report.live_fields += 1;
            }
        }
    }

    for (id, class) in table.iter() {
        if class.eliminated || class.is_interface() {
            continue;
        }
        let has_live_subclass = table
            .direct_subtypes(id)
            .iter()
            .any(|sub| !table.by_id(*sub).eliminated);
        if !has_live_subclass {
            report.effectively_final.insert(class.name.clone());
        }
    }

    report.duration = start.elapsed();
    info!(
        live_classes = report.live_classes.len(),
        eliminated_classes = report.eliminated_classes.len(),
        live_methods = report.live_methods,
        eliminated_methods = report.eliminated_methods,
        elapsed_ms = report.duration.as_millis() as u64,
        "cull complete"
    );
    Ok(report)
}
