//! Flow Data Model
//!
//! Core data structures describing a recorded flow: typed nodes, labeled
//! edges, named subflows, variable declarations and URL bindings.
//!
//! # Example YAML Format
//!
//! ```yaml
//! id: checkout
//! name: Checkout smoke test
//! variables:
//!   - key: email
//!     required: true
//!   - key: password
//!     sensitive: true
//! nodes:
//!   - id: open
//!     type: navigate
//!     url: https://shop.example.com/
//!     after:
//!       wait_for_navigation: true
//!   - id: login
//!     type: fill
//!     selector: "#email"
//!     value: "{email}"
//!     retry:
//!       count: 2
//!       interval_ms: 250
//!       backoff: linear
//!   - id: report
//!     type: screenshot
//! edges:
//!   - from: open
//!     to: login
//!   - from: login
//!     to: report
//! meta:
//!   bindings:
//!     - type: domain
//!       value: shop.example.com
//! ```

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::config::EngineConfig;
use crate::execution::retry::RetryConfig;

/// The shared variable bag of a run.
pub type Variables = serde_json::Map<String, Value>;

/// Label followed after a successful step when nothing overrides it.
pub const DEFAULT_LABEL: &str = "default";

/// Reserved label for edges taken after a step exhausts its retries.
pub const ON_ERROR_LABEL: &str = "onError";

/// Step type whose `url` parameter seeds the default start URL.
pub const NAVIGATE_KIND: &str = "navigate";

/// A recorded automation flow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Flow {
    /// Unique flow identifier
    pub id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: String,

    /// Declared variables with defaults and validation rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableDef>,

    /// Top-level nodes
    #[serde(default)]
    pub nodes: Vec<Node>,

    /// Top-level edges
    #[serde(default)]
    pub edges: Vec<Edge>,

    /// Nested graphs invoked by `foreach`/`while`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subflows: BTreeMap<String, Subflow>,

    /// Flow metadata (URL bindings)
    #[serde(default)]
    pub meta: FlowMeta,
}

/// A nested node/edge graph.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Subflow {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Flow metadata.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct FlowMeta {
    /// Pages this flow may run against; empty means unrestricted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
}

/// Kind of URL constraint.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BindingKind {
    /// Host equals the value or is a subdomain of it
    Domain,
    /// URL path starts with the value
    Path,
    /// Full URL starts with the value
    Url,
}

/// A URL constraint on where a flow may run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Binding {
    #[serde(rename = "type")]
    pub kind: BindingKind,
    pub value: String,
}

impl Binding {
    pub fn new(kind: BindingKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    /// Checks whether a page URL satisfies this binding.
    pub fn matches(&self, url: &Url) -> bool {
        match self.kind {
            BindingKind::Domain => {
                let domain = self.value.trim().trim_start_matches('.').to_ascii_lowercase();
                match url.host_str() {
                    Some(host) => {
                        let host = host.to_ascii_lowercase();
                        host == domain || host.ends_with(&format!(".{}", domain))
                    }
                    None => false,
                }
            }
            BindingKind::Path => url.path().starts_with(self.value.trim()),
            BindingKind::Url => url.as_str().starts_with(self.value.trim()),
        }
    }
}

impl FlowMeta {
    /// Returns true when no bindings are declared or any binding matches.
    ///
    /// An unparsable URL never matches a non-empty binding list.
    pub fn allows(&self, url: &str) -> bool {
        if self.bindings.is_empty() {
            return true;
        }
        match Url::parse(url) {
            Ok(parsed) => self.bindings.iter().any(|b| b.matches(&parsed)),
            Err(_) => false,
        }
    }
}

/// Validation rules for a declared variable.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct VariableRules {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// A variable declared by a flow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VariableDef {
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Excluded from outputs and never logged
    #[serde(default)]
    pub sensitive: bool,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub rules: VariableRules,
}

impl VariableDef {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: None,
            default: None,
            sensitive: false,
            required: false,
            rules: VariableRules::default(),
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_rules(mut self, rules: VariableRules) -> Self {
        self.rules = rules;
        self
    }
}

/// Post-conditions applied after a step's executor returns.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(default)]
pub struct AfterFlags {
    /// Wait for the page to finish a navigation, then prime it
    pub wait_for_navigation: bool,
    /// Wait for the network to settle
    pub wait_for_network_idle: bool,
}

impl AfterFlags {
    fn is_empty(&self) -> bool {
        !self.wait_for_navigation && !self.wait_for_network_idle
    }
}

/// A declared step in a flow graph.
///
/// Everything that is not a well-known field is kept in `params` and
/// handed to the executor registered for `kind`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "AfterFlags::is_empty")]
    pub after: AfterFlags,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub screenshot_on_fail: bool,

    #[serde(flatten)]
    pub params: Variables,
}

impl Node {
    /// Creates a node with no parameters.
    ///
    /// # Example
    ///
    /// ```
    /// use flowreplay::flow::Node;
    /// use serde_json::json;
    ///
    /// let node = Node::new("open", "navigate")
    ///     .with_param("url", json!("https://example.com"))
    ///     .with_timeout(5_000);
    /// assert_eq!(node.kind, "navigate");
    /// ```
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into().trim().to_string(),
            kind: kind.into().trim().to_string(),
            retry: None,
            timeout_ms: None,
            after: AfterFlags::default(),
            screenshot_on_fail: false,
            params: Variables::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_after(mut self, after: AfterFlags) -> Self {
        self.after = after;
        self
    }

    pub fn with_screenshot_on_fail(mut self) -> Self {
        self.screenshot_on_fail = true;
        self
    }
}

/// A directed, optionally labeled connection between two nodes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            label: None,
        }
    }

    pub fn labeled(
        from: impl Into<String>,
        to: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            label: Some(label.into()),
        }
    }

    pub fn on_error(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::labeled(from, to, ON_ERROR_LABEL)
    }

    /// The label this edge answers to; absent labels read as `default`.
    pub fn effective_label(&self) -> &str {
        self.label.as_deref().unwrap_or(DEFAULT_LABEL)
    }

    pub fn is_on_error(&self) -> bool {
        self.effective_label() == ON_ERROR_LABEL
    }

    /// Unlabeled or explicitly `default` edges.
    pub fn is_default(&self) -> bool {
        self.effective_label() == DEFAULT_LABEL
    }
}

impl Flow {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn with_variable(mut self, variable: VariableDef) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn with_subflow(mut self, name: impl Into<String>, subflow: Subflow) -> Self {
        self.subflows.insert(name.into(), subflow);
        self
    }

    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.meta.bindings.push(binding);
        self
    }

    /// Gets a top-level node by ID.
    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// URL of the first navigate step, used when the caller gives none.
    pub fn default_start_url(&self) -> Option<String> {
        self.nodes
            .iter()
            .filter(|n| n.kind == NAVIGATE_KIND)
            .find_map(|n| n.params.get("url").and_then(Value::as_str))
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
    }

    /// Keys of variables marked sensitive.
    pub fn sensitive_keys(&self) -> Vec<&str> {
        self.variables
            .iter()
            .filter(|v| v.sensitive)
            .map(|v| v.key.as_str())
            .collect()
    }

    /// Returns the number of top-level nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the flow has no top-level nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Subflow {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }
}

/// Runtime projection of a node with its policies resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub id: String,
    pub kind: String,
    pub params: Variables,
    pub retry: RetryConfig,
    pub timeout_ms: Option<u64>,
    pub after: AfterFlags,
    pub screenshot_on_fail: bool,
}

impl Step {
    /// Resolves a node against engine defaults.
    pub fn from_node(node: &Node, config: &EngineConfig) -> Self {
        Self {
            id: node.id.clone(),
            kind: node.kind.clone(),
            params: node.params.clone(),
            retry: node.retry.clone().unwrap_or_else(|| config.default_retry.clone()),
            timeout_ms: node.timeout_ms.or(config.default_step_timeout_ms),
            after: node.after,
            screenshot_on_fail: node.screenshot_on_fail,
        }
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(Value::as_u64)
    }

    /// Deserializes a parameter into a typed value.
    pub fn param_as<T: DeserializeOwned>(&self, key: &str) -> Option<Result<T, serde_json::Error>> {
        self.params
            .get(key)
            .map(|value| serde_json::from_value(value.clone()))
    }
}
