use lexflow_core::{EngineError, NodeProcessor, NodeType};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry mapping each node type to the capability that processes it.
///
/// Held by an engine instance rather than as a module-level singleton, so
/// isolated engines (per tenant, per test) carry their own registrations.
pub struct ProcessorRegistry {
    processors: HashMap<NodeType, Arc<dyn NodeProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self {
            processors: HashMap::new(),
        }
    }

    pub fn register(&mut self, processor: Arc<dyn NodeProcessor>) {
        let node_type = processor.node_type();
        tracing::info!("registering processor for node type: {}", node_type);
        self.processors.insert(node_type, processor);
    }

    pub fn processor(&self, node_type: NodeType) -> Result<Arc<dyn NodeProcessor>, EngineError> {
        self.processors
            .get(&node_type)
            .cloned()
            .ok_or(EngineError::UnknownNodeType(node_type))
    }

    pub fn registered_types(&self) -> Vec<NodeType> {
        self.processors.keys().copied().collect()
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
