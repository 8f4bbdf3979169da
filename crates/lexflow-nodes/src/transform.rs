use async_trait::async_trait;
use lexflow_core::{
    ArithmeticOp, DataMap, FieldTransform, NodeConfig, NodeOutcome, NodeProcessor, NodeResult,
    NodeType, Operand, ProcessorContext, ProcessorError,
};
use serde_json::{Number, Value};

/// Applies the configured field transforms to the execution context, in
/// order. The mutated context is handed back to the engine as context
/// updates; the processor itself never touches engine state.
pub struct DataTransformationProcessor;

#[async_trait]
impl NodeProcessor for DataTransformationProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::DataTransformation
    }

    async fn process(&self, ctx: ProcessorContext<'_>) -> Result<NodeOutcome, ProcessorError> {
        let NodeConfig::DataTransformation(cfg) = &ctx.node.config else {
            return Err(ProcessorError::Configuration(
                "transformation node carries a non-transformation config".to_string(),
            ));
        };
        let mut working = ctx.context.clone();
        for transform in &cfg.transformations {
            apply(transform, &mut working)?;
        }
        let mut result = NodeResult::new("output").with_data(
            "applied",
            cfg.transformations.len() as i64,
        );
        result.context_updates = working;
        Ok(NodeOutcome::Advance(result))
    }
}

fn apply(transform: &FieldTransform, context: &mut DataMap) -> Result<(), ProcessorError> {
    match transform {
        FieldTransform::Copy { source, target } => {
            if let Some(value) = context.get(source).cloned() {
                context.insert(target.clone(), value);
            }
        }
        FieldTransform::Set { target, value } => {
            context.insert(target.clone(), value.clone());
        }
        FieldTransform::Uppercase { field } => {
            if let Some(Value::String(s)) = context.get(field) {
                let upper = s.to_uppercase();
                context.insert(field.clone(), Value::String(upper));
            }
        }
        FieldTransform::Lowercase { field } => {
            if let Some(Value::String(s)) = context.get(field) {
                let lower = s.to_lowercase();
                context.insert(field.clone(), Value::String(lower));
            }
        }
        FieldTransform::Calculate {
            target,
            left,
            operator,
            right,
        } => {
            let a = resolve(left, context)?;
            let b = resolve(right, context)?;
            let value = match operator {
                ArithmeticOp::Add => a + b,
                ArithmeticOp::Subtract => a - b,
                ArithmeticOp::Multiply => a * b,
                ArithmeticOp::Divide => {
                    if b == 0.0 {
                        return Err(ProcessorError::Failed(format!(
                            "division by zero computing '{}'",
                            target
                        )));
                    }
                    a / b
                }
            };
            let number = Number::from_f64(value).ok_or_else(|| {
                ProcessorError::Failed(format!("'{}' is not a representable number", target))
            })?;
            context.insert(target.clone(), Value::Number(number));
        }
    }
    Ok(())
}

fn resolve(operand: &Operand, context: &DataMap) -> Result<f64, ProcessorError> {
    match operand {
        Operand::Number(n) => Ok(*n),
        Operand::Field(name) => match context.get(name) {
            Some(Value::Number(n)) => n.as_f64().ok_or_else(|| {
                ProcessorError::Failed(format!("field '{}' is not a representable number", name))
            }),
            Some(Value::String(s)) => s.trim().parse().map_err(|_| {
                ProcessorError::Failed(format!("field '{}' is not numeric", name))
            }),
            _ => Err(ProcessorError::Failed(format!(
                "field '{}' is missing or not numeric",
                name
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexflow_core::{DataTransformationConfig, WorkflowNode};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn context() -> DataMap {
        let mut ctx = DataMap::new();
        ctx.insert("client".to_string(), json!("acme llp"));
        ctx.insert("hours".to_string(), json!(10));
        ctx.insert("rate".to_string(), json!(350));
        ctx
    }

    async fn run(transforms: Vec<FieldTransform>) -> Result<DataMap, ProcessorError> {
        let node = WorkflowNode::new(
            "Prepare billing fields",
            NodeConfig::DataTransformation(DataTransformationConfig {
                transformations: transforms,
            }),
        );
        let context = context();
        let token = CancellationToken::new();
        let outcome = DataTransformationProcessor
            .process(ProcessorContext {
                node: &node,
                context: &context,
                last_result: None,
                cancellation: &token,
            })
            .await?;
        match outcome {
            NodeOutcome::Advance(result) => Ok(result.context_updates),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn copy_set_and_case_transforms() {
        let updated = run(vec![
            FieldTransform::Copy {
                source: "client".to_string(),
                target: "billing_name".to_string(),
            },
            FieldTransform::Uppercase {
                field: "billing_name".to_string(),
            },
            FieldTransform::Set {
                target: "currency".to_string(),
                value: json!("USD"),
            },
        ])
        .await
        .unwrap();
        assert_eq!(updated.get("billing_name"), Some(&json!("ACME LLP")));
        assert_eq!(updated.get("client"), Some(&json!("acme llp")));
        assert_eq!(updated.get("currency"), Some(&json!("USD")));
    }

    #[tokio::test]
    async fn calculate_combines_fields_and_literals() {
        let updated = run(vec![FieldTransform::Calculate {
            target: "amount".to_string(),
            left: Operand::Field("hours".to_string()),
            operator: ArithmeticOp::Multiply,
            right: Operand::Field("rate".to_string()),
        }])
        .await
        .unwrap();
        assert_eq!(updated.get("amount"), Some(&json!(3500.0)));
    }

    #[tokio::test]
    async fn division_by_zero_fails_the_node() {
        let err = run(vec![FieldTransform::Calculate {
            target: "ratio".to_string(),
            left: Operand::Field("hours".to_string()),
            operator: ArithmeticOp::Divide,
            right: Operand::Number(0.0),
        }])
        .await
        .unwrap_err();
        assert!(matches!(err, ProcessorError::Failed(_)));
    }

    #[tokio::test]
    async fn copy_of_missing_field_is_a_no_op() {
        let updated = run(vec![FieldTransform::Copy {
            source: "missing".to_string(),
            target: "target".to_string(),
        }])
        .await
        .unwrap();
        assert!(!updated.contains_key("target"));
    }
}
