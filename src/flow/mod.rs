//! Flow Definition Module
//!
//! Handles flow definitions, including:
//! - Data model (nodes, labeled edges, subflows, variables, bindings)
//! - Loading and saving (YAML / JSON)
//! - Structural validation and graph indexing
//! - Condition expressions and variable resolution

pub mod expression;
pub mod graph;
pub mod model;
pub mod parser;
pub mod validator;
pub mod variables;

pub use expression::{CompiledCondition, Condition};
pub use graph::FlowGraph;
pub use model::{
    AfterFlags, Binding, BindingKind, Edge, Flow, FlowMeta, Node, Step, Subflow, VariableDef,
    VariableRules, Variables, DEFAULT_LABEL, ON_ERROR_LABEL,
};
pub use parser::{load_flow, save_flow};
pub use validator::{quick_validate, validate_flow};
