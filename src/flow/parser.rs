//! Flow Parser
//!
//! Loads and saves flow definitions. Files ending in `.json` are read as
//! JSON, everything else as YAML.

use std::fs;
use std::path::Path;

use log::{debug, info};

use super::model::Flow;
use super::validator::{quick_validate, validate_flow};
use crate::error::FlowError;

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Loads a flow definition from disk.
///
/// This function:
/// 1. Reads and parses the file (YAML or JSON)
/// 2. Validates the graph structure
/// 3. Logs warnings for suspicious but runnable structure
///
/// # Example
///
/// ```rust,no_run
/// use flowreplay::flow::load_flow;
///
/// fn main() -> Result<(), flowreplay::FlowError> {
///     let flow = load_flow("checkout.yaml")?;
///     println!("Loaded {} nodes", flow.nodes.len());
///     Ok(())
/// }
/// ```
pub fn load_flow(path: impl AsRef<Path>) -> Result<Flow, FlowError> {
    let path = path.as_ref();
    info!("Loading flow from: {}", path.display());

    let content = fs::read_to_string(path)?;
    debug!("Flow content loaded ({} bytes)", content.len());

    let flow: Flow = if is_json(path) {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };

    info!(
        "Parsed flow '{}': {} nodes, {} edges, {} subflows",
        flow.id,
        flow.nodes.len(),
        flow.edges.len(),
        flow.subflows.len()
    );

    validate_flow(&flow)?;
    quick_validate(&flow);

    Ok(flow)
}

/// Saves a flow definition, choosing the format from the extension.
pub fn save_flow(flow: &Flow, path: impl AsRef<Path>) -> Result<(), FlowError> {
    let path = path.as_ref();
    let content = if is_json(path) {
        serde_json::to_string_pretty(flow)?
    } else {
        serde_yaml::to_string(flow)?
    };

    fs::write(path, content)?;
    info!("Flow saved to: {}", path.display());
    Ok(())
}
