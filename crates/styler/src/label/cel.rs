//! CEL backed label evaluation.

use super::{LabelError, LabelEvaluator, LabelProgram, RESOURCES_VARIABLE, functions};
use cel_interpreter::{Context, Program, Value};
use kube::api::DynamicObject;
use std::sync::Arc;

/// Evaluates labels as CEL expressions.
///
/// The matched resources are bound as `resources`, a list of objects in
/// their JSON form. Besides the CEL standard functions, `format`,
/// `base64Decode` and `parseCert` are available.
#[derive(Debug, Default, Clone, Copy)]
pub struct CelEvaluator;

impl CelEvaluator {
    /// Create a new evaluator
    pub fn new() -> Self {
        Self
    }
}

impl LabelEvaluator for CelEvaluator {
    fn compile(&self, template: &str) -> Result<Arc<dyn LabelProgram>, LabelError> {
        let program = Program::compile(template).map_err(|e| LabelError::Compile {
            template: template.to_string(),
            message: e.to_string(),
        })?;
        Ok(Arc::new(CelProgram {
            template: template.to_string(),
            program,
        }))
    }
}

struct CelProgram {
    template: String,
    program: Program,
}

impl CelProgram {
    fn evaluate_error(&self, message: impl ToString) -> LabelError {
        LabelError::Evaluate {
            template: self.template.clone(),
            message: message.to_string(),
        }
    }
}

impl LabelProgram for CelProgram {
    fn template(&self) -> &str {
        &self.template
    }

    fn evaluate(&self, resources: &[DynamicObject]) -> Result<String, LabelError> {
        let values = resources
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.evaluate_error(e))?;

        let mut context = Context::default();
        functions::register(&mut context);
        context
            .add_variable(RESOURCES_VARIABLE, values)
            .map_err(|e| self.evaluate_error(e))?;

        match self.program.execute(&context) {
            Ok(Value::String(label)) => Ok(label.as_str().to_string()),
            Ok(other) => Err(LabelError::NotAString {
                template: self.template.clone(),
                kind: functions::kind(&other).to_string(),
            }),
            Err(e) => Err(self.evaluate_error(e)),
        }
    }
}
