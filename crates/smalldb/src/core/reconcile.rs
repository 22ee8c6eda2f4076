//! Merging a parsed diagram into a definition builder
//!
//! Diagram content is always derived: a directly declared attribute wins
//! over the diagram, two diagrams that disagree conflict, and a diagram
//! that redraws a declared transition with other targets is rejected.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, span, Level};

use super::builder::DefinitionBuilder;
use super::diagram::{Diagram, DiagramNode, NodeKind};
use super::error::BuildError;
use super::types::{Provenance, StateName};

/// What one reconciliation added
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub states: usize,
    pub transitions: usize,
    pub skipped_edges: usize,
}

/// Nodes and edges of a diagram visible to one include
struct Scope<'a> {
    diagram: &'a Diagram,
    group: Option<&'a str>,
}

impl<'a> Scope<'a> {
    fn new(diagram: &'a Diagram, group: Option<&'a str>) -> Self {
        Self { diagram, group }
    }

    fn contains(&self, node: &DiagramNode) -> bool {
        match self.group {
            None => true,
            // Start and end markers belong to every group
            Some(_) if node.kind == NodeKind::NotExists => true,
            Some(group) => node.group.as_deref().is_some_and(|g| {
                g == group
                    || self
                        .diagram
                        .groups
                        .iter()
                        .any(|dg| dg.id == group && dg.name.as_deref() == Some(g))
            }),
        }
    }

    fn nodes(&self) -> impl Iterator<Item = &'a DiagramNode> + '_ {
        self.diagram.nodes.iter().filter(move |n| self.contains(n))
    }
}

enum Endpoint {
    State(StateName),
    OutOfScope,
}

/// Merge `diagram` (restricted to `group`, if given) into `builder`.
///
/// `file` names the diagram in provenance and in errors.
pub fn reconcile(
    builder: &mut DefinitionBuilder,
    diagram: &Diagram,
    file: &str,
    group: Option<&str>,
) -> Result<ReconcileSummary, BuildError> {
    let reconcile_span = span!(Level::DEBUG, "reconcile_diagram", file, group);
    let _enter = reconcile_span.enter();

    let group_id = match group {
        Some(group) => Some(diagram.group_id(group).ok_or_else(|| BuildError::UnknownDiagramGroup {
            class: builder.class_name().to_string(),
            file: file.to_string(),
            group: group.to_string(),
        })?),
        None => None,
    };
    let scope = Scope::new(diagram, group_id);
    let by = match group {
        Some(group) => Provenance::derived(format!("diagram {} [{}]", file, group)),
        None => Provenance::derived(format!("diagram {}", file)),
    };

    let mut summary = ReconcileSummary::default();

    for node in scope.nodes().filter(|n| n.kind == NodeKind::State) {
        let state = node.state_name();
        if !builder.has_state(&state) {
            summary.states += 1;
        }
        builder.add_state(state.clone(), by.clone())?;
        builder.set_state_style(&state, node.color.as_deref(), node.label.as_deref(), &by)?;
    }

    let resolve = |builder: &DefinitionBuilder, id: &str| -> Result<Endpoint, BuildError> {
        if let Some(node) = diagram.node(id) {
            return Ok(if scope.contains(node) {
                Endpoint::State(node.state_name())
            } else {
                Endpoint::OutOfScope
            });
        }
        let state = StateName::from(id);
        if builder.has_direct_state(&state) {
            return Ok(Endpoint::State(state));
        }
        Err(BuildError::UnknownDiagramNode {
            class: builder.class_name().to_string(),
            file: file.to_string(),
            node: id.to_string(),
        })
    };

    // Labeled edges sharing a source and a label form one transition
    let mut named: BTreeMap<(StateName, String), (BTreeSet<StateName>, Vec<&str>)> = BTreeMap::new();
    let mut unnamed: Vec<(StateName, StateName, Option<&str>)> = Vec::new();

    for edge in &diagram.edges {
        let (source, target) = match (resolve(&*builder, &edge.source)?, resolve(&*builder, &edge.target)?) {
            (Endpoint::State(source), Endpoint::State(target)) => (source, target),
            _ => {
                debug!(source = %edge.source, target = %edge.target, "Skipping edge outside of the included group");
                summary.skipped_edges += 1;
                continue;
            }
        };
        match &edge.label {
            Some(label) => {
                let (targets, colors) = named.entry((source, label.clone())).or_default();
                targets.insert(target);
                colors.extend(edge.color.as_deref());
            }
            None => unnamed.push((source, target, edge.color.as_deref())),
        }
    }

    for ((source, name), (targets, colors)) in named {
        let declared = builder.direct_targets_of(&source, &name);
        if !declared.is_empty() && !declared.contains(&&targets) {
            let declared_targets = declared
                .iter()
                .flat_map(|set| set.iter().map(|s| s.to_string()))
                .collect();
            return Err(BuildError::DiagramMismatch {
                class: builder.class_name().to_string(),
                file: file.to_string(),
                source_state: source.to_string(),
                name,
                declared_targets,
                diagram_targets: targets.iter().map(|s| s.to_string()).collect(),
            });
        }

        let key = builder.add_transition(source, targets)?;
        builder.name_transition(&key, &name, by.clone())?;
        for color in colors {
            builder.set_transition_color(&key, color, by.clone())?;
        }
        summary.transitions += 1;
    }

    for (source, target, color) in unnamed {
        let key = builder.add_transition(source, [target])?;
        if let Some(color) = color {
            builder.set_transition_color(&key, color, by.clone())?;
        }
        summary.transitions += 1;
    }

    debug!(
        states = summary.states,
        transitions = summary.transitions,
        skipped = summary.skipped_edges,
        "Diagram reconciled"
    );
    Ok(summary)
}
