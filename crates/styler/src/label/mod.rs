//! Label expressions.
//!
//! Labels are user supplied expressions evaluated against the resources a
//! node matched. The expression language sits behind [`LabelEvaluator`] and
//! [`LabelProgram`]; [`CelEvaluator`] is the implementation used by default.

mod cel;
mod functions;

pub use cel::CelEvaluator;

use kube::api::DynamicObject;
use std::sync::Arc;
use thiserror::Error;

/// Name the matched resources are bound to in an expression
pub const RESOURCES_VARIABLE: &str = "resources";

/// Errors from compiling or evaluating a label
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LabelError {
    /// The template is not a valid expression
    #[error("failed to compile label expression {template:?}: {message}")]
    Compile {
        /// Offending template
        template: String,
        /// Compiler message
        message: String,
    },

    /// Evaluation failed at runtime
    #[error("failed to evaluate label expression {template:?}: {message}")]
    Evaluate {
        /// Offending template
        template: String,
        /// Runtime message
        message: String,
    },

    /// The expression produced something other than a string
    #[error("label must evaluate to a string, {template:?} produced {kind}")]
    NotAString {
        /// Offending template
        template: String,
        /// Type that was produced
        kind: String,
    },
}

/// Compiles label templates
pub trait LabelEvaluator: Send + Sync {
    /// Compile a template into a reusable program
    fn compile(&self, template: &str) -> Result<Arc<dyn LabelProgram>, LabelError>;
}

/// A compiled label template
pub trait LabelProgram: Send + Sync {
    /// Source text of the template
    fn template(&self) -> &str;

    /// Evaluate against the matched resources; must produce a string
    fn evaluate(&self, resources: &[DynamicObject]) -> Result<String, LabelError>;
}

impl std::fmt::Debug for dyn LabelProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LabelProgram").field(&self.template()).finish()
    }
}
