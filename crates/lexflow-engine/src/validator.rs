//! Structural and semantic validation of workflow definitions.
//!
//! Runs before activation and defensively before every execution; a
//! definition may only transition Draft -> Active when `valid` is true.

use lexflow_core::{NodeConfig, NodeId, NodeType, WorkflowDefinition};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

pub fn validate(definition: &WorkflowDefinition) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    check_entry_and_exit(definition, &mut errors, &mut warnings);
    check_connections(definition, &mut errors);
    check_orphans(definition, &mut warnings);
    check_cycles(definition, &mut errors);
    for node in definition.nodes.values() {
        check_node_config(&node.name, &node.config, &mut errors, &mut warnings);
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

fn check_entry_and_exit(
    definition: &WorkflowDefinition,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    let starts = definition
        .nodes
        .values()
        .filter(|n| n.node_type() == NodeType::Start)
        .count();
    let ends = definition
        .nodes
        .values()
        .filter(|n| n.node_type() == NodeType::End)
        .count();

    if starts == 0 {
        errors.push("workflow has no start node".to_string());
    }
    if ends == 0 {
        errors.push("workflow has no end node".to_string());
    }
    if starts > 1 {
        warnings.push(format!(
            "workflow has {} start nodes; the entry point is ambiguous",
            starts
        ));
    }
}

fn check_connections(definition: &WorkflowDefinition, errors: &mut Vec<String>) {
    for conn in &definition.connections {
        match definition.find_node(conn.source_node_id) {
            None => errors.push(format!(
                "connection {} references unknown source node {}",
                conn.id, conn.source_node_id
            )),
            Some(source) => {
                if !source.output_ports().contains(&conn.source_output.as_str()) {
                    errors.push(format!(
                        "connection {} leaves node '{}' through undeclared output port '{}'",
                        conn.id, source.name, conn.source_output
                    ));
                }
            }
        }
        match definition.find_node(conn.target_node_id) {
            None => errors.push(format!(
                "connection {} references unknown target node {}",
                conn.id, conn.target_node_id
            )),
            Some(target) => {
                if !target.input_ports().contains(&conn.target_input.as_str()) {
                    errors.push(format!(
                        "connection {} enters node '{}' through undeclared input port '{}'",
                        conn.id, target.name, conn.target_input
                    ));
                }
            }
        }
    }
}

/// Nodes untouched by any connection. A warning, not an error: authors build
/// graphs incrementally.
fn check_orphans(definition: &WorkflowDefinition, warnings: &mut Vec<String>) {
    let mut touched: HashSet<NodeId> = HashSet::new();
    for conn in &definition.connections {
        touched.insert(conn.source_node_id);
        touched.insert(conn.target_node_id);
    }
    for node in definition.nodes.values() {
        if touched.contains(&node.id) {
            continue;
        }
        if matches!(node.node_type(), NodeType::Start | NodeType::End) {
            continue;
        }
        warnings.push(format!("node '{}' is not connected to the workflow", node.name));
    }
}

/// Cycle detection over non-conditional edges. The engine has no loop-back
/// primitive, so a cycle would traverse forever.
fn check_cycles(definition: &WorkflowDefinition, errors: &mut Vec<String>) {
    let mut graph = DiGraph::<NodeId, ()>::new();
    let mut indices = HashMap::new();

    for id in definition.nodes.keys() {
        indices.insert(*id, graph.add_node(*id));
    }
    for conn in &definition.connections {
        if conn.condition.is_some() {
            continue;
        }
        if let (Some(&from), Some(&to)) = (
            indices.get(&conn.source_node_id),
            indices.get(&conn.target_node_id),
        ) {
            graph.add_edge(from, to, ());
        }
    }

    if toposort(&graph, None).is_err() {
        errors.push("circular dependency detected".to_string());
    }
}

fn check_node_config(
    name: &str,
    config: &NodeConfig,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    match config {
        NodeConfig::Email(cfg) => {
            if cfg.to.trim().is_empty() {
                errors.push(format!("email node '{}' is missing a recipient", name));
            }
            if cfg.subject.trim().is_empty() {
                errors.push(format!("email node '{}' is missing a subject", name));
            }
        }
        NodeConfig::Approval(cfg) => {
            if cfg.approvers.is_empty() {
                errors.push(format!("approval node '{}' has no approvers", name));
            }
        }
        NodeConfig::Condition(cfg) => {
            if cfg.conditions.is_empty() {
                errors.push(format!("condition node '{}' has no conditions", name));
            }
        }
        NodeConfig::Decision(cfg) => {
            if cfg.conditions.is_empty() {
                warnings.push(format!(
                    "decision node '{}' has no conditions and will always route to 'no'",
                    name
                ));
            }
        }
        NodeConfig::Webhook(cfg) => {
            if cfg.url.trim().is_empty() {
                errors.push(format!("webhook node '{}' is missing a url", name));
            }
        }
        NodeConfig::Delay(cfg) => {
            if cfg.duration_secs == 0 {
                errors.push(format!("delay node '{}' is missing a duration", name));
            }
        }
        _ => {}
    }
}
