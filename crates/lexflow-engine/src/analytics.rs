//! Execution analytics derived from completed execution records.

use lexflow_core::{ExecutionStatus, NodeRunStatus, WorkflowDefinition, WorkflowExecution};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowAnalytics {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Percentage in [0, 100]; exactly 0 when there are no executions.
    pub success_rate: f64,
    /// Average over executions with both start and completion timestamps;
    /// None (not zero) when no such execution exists.
    pub avg_duration_ms: Option<f64>,
    /// Keyed by node display name at the current definition version. Nodes
    /// removed since are keyed by their id.
    pub per_node: HashMap<String, NodeStats>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeStats {
    pub executions: u64,
    pub failures: u64,
}

pub fn aggregate<'a>(
    definition: &WorkflowDefinition,
    executions: impl IntoIterator<Item = &'a WorkflowExecution>,
) -> WorkflowAnalytics {
    let mut total = 0;
    let mut completed = 0;
    let mut failed = 0;
    let mut durations = Vec::new();
    let mut per_node: HashMap<String, NodeStats> = HashMap::new();

    for execution in executions {
        total += 1;
        match execution.status {
            ExecutionStatus::Completed => completed += 1,
            ExecutionStatus::Failed => failed += 1,
            _ => {}
        }
        if let Some(ms) = execution.duration_ms() {
            durations.push(ms as f64);
        }
        for (node_id, run) in &execution.node_executions {
            let name = definition
                .find_node(*node_id)
                .map(|n| n.name.clone())
                .unwrap_or_else(|| node_id.to_string());
            let stats = per_node.entry(name).or_default();
            stats.executions += 1;
            if run.status != NodeRunStatus::Completed {
                stats.failures += 1;
            }
        }
    }

    let success_rate = if total == 0 {
        0.0
    } else {
        completed as f64 / total as f64 * 100.0
    };
    let avg_duration_ms = if durations.is_empty() {
        None
    } else {
        Some(durations.iter().sum::<f64>() / durations.len() as f64)
    };

    WorkflowAnalytics {
        total,
        completed,
        failed,
        success_rate,
        avg_duration_ms,
        per_node,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use lexflow_core::{DataMap, NodeConfig, NodeRun, WorkflowNode};
    use uuid::Uuid;

    fn definition() -> WorkflowDefinition {
        WorkflowDefinition::new("stats", Uuid::new_v4(), "author")
    }

    fn execution(def: &WorkflowDefinition, status: ExecutionStatus) -> WorkflowExecution {
        let mut exec = WorkflowExecution::new(def.id, def.version, &DataMap::new(), DataMap::new(), "test");
        exec.status = status;
        exec
    }

    #[test]
    fn zero_executions_has_zero_success_rate() {
        let def = definition();
        let stats = aggregate(&def, std::iter::empty());
        assert_eq!(stats.total, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert!(stats.avg_duration_ms.is_none());
    }

    #[test]
    fn success_rate_for_three_of_four() {
        let def = definition();
        let execs = vec![
            execution(&def, ExecutionStatus::Completed),
            execution(&def, ExecutionStatus::Completed),
            execution(&def, ExecutionStatus::Completed),
            execution(&def, ExecutionStatus::Failed),
        ];
        let stats = aggregate(&def, &execs);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.success_rate, 75.0);
    }

    #[test]
    fn average_duration_only_counts_finished_executions() {
        let def = definition();
        let mut done = execution(&def, ExecutionStatus::Completed);
        done.completed_at = Some(done.started_at + Duration::milliseconds(200));
        let running = execution(&def, ExecutionStatus::InProgress);
        let stats = aggregate(&def, [&done, &running]);
        assert_eq!(stats.avg_duration_ms, Some(200.0));
    }

    #[test]
    fn per_node_failures_use_display_names() {
        let mut def = definition();
        let node_id = def.add_node(WorkflowNode::new("Send engagement letter", NodeConfig::Start));

        let mut ok = execution(&def, ExecutionStatus::Completed);
        ok.record_node(node_id, NodeRun::completed(DataMap::new(), 1));
        let mut bad = execution(&def, ExecutionStatus::Failed);
        bad.record_node(node_id, NodeRun::failed(DataMap::new(), 2));

        let stats = aggregate(&def, [&ok, &bad]);
        let node = &stats.per_node["Send engagement letter"];
        assert_eq!(node.executions, 2);
        assert_eq!(node.failures, 1);
    }
}
