//! Generic diagram model shared by all diagram readers
//!
//! Every supported file format is parsed into a [`Diagram`]: nodes (states),
//! edges (transitions), optional groups (swimlanes, participants, composite
//! states) and references to further diagram files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use super::error::DiagramError;
use super::types::StateName;

/// File formats a diagram can be read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramFormat {
    /// Mermaid `stateDiagram` text
    Mermaid,
    /// JSON document with `nodes`, `edges`, `groups` and `includes`
    Json,
    GraphMl,
    Bpmn,
}

impl DiagramFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        match extension.as_str() {
            "mmd" | "mermaid" => Some(Self::Mermaid),
            "json" => Some(Self::Json),
            "graphml" => Some(Self::GraphMl),
            "bpmn" => Some(Self::Bpmn),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mermaid => "mermaid",
            Self::Json => "json",
            Self::GraphMl => "graphml",
            Self::Bpmn => "bpmn",
        }
    }

    /// Get all valid format names
    pub fn variants() -> &'static [&'static str] {
        &["mermaid", "json", "graphml", "bpmn"]
    }
}

impl FromStr for DiagramFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mermaid" | "mmd" => Ok(Self::Mermaid),
            "json" => Ok(Self::Json),
            "graphml" => Ok(Self::GraphMl),
            "bpmn" => Ok(Self::Bpmn),
            _ => Err(format!("Unknown diagram format: {}", s)),
        }
    }
}

impl fmt::Display for DiagramFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Node kind in a diagram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    #[default]
    State,
    /// Start or end marker; maps to the not-exists pseudo-state
    #[serde(alias = "start", alias = "end")]
    NotExists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramNode {
    pub id: String,
    /// State name; the node id is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl DiagramNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            kind: NodeKind::State,
            group: None,
            color: None,
            label: None,
        }
    }

    pub fn not_exists(id: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::NotExists,
            ..Self::new(id)
        }
    }

    /// State this node stands for
    pub fn state_name(&self) -> StateName {
        match self.kind {
            NodeKind::NotExists => StateName::not_exists(),
            NodeKind::State => StateName::new(self.name.as_deref().unwrap_or(&self.id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramEdge {
    pub source: String,
    pub target: String,
    /// Transition name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl DiagramEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            label: None,
            color: None,
        }
    }

    pub fn with_label(source: impl Into<String>, target: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::new(source, target)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramGroup {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Reference from one diagram to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramInclude {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// Parsed diagram, independent of its file format
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagram {
    #[serde(default)]
    pub nodes: Vec<DiagramNode>,
    #[serde(default)]
    pub edges: Vec<DiagramEdge>,
    #[serde(default)]
    pub groups: Vec<DiagramGroup>,
    #[serde(default)]
    pub includes: Vec<DiagramInclude>,
}

impl Diagram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &str) -> Option<&DiagramNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Add a node unless one with the same id exists
    pub fn ensure_node(&mut self, node: DiagramNode) -> &mut DiagramNode {
        let index = match self.nodes.iter().position(|n| n.id == node.id) {
            Some(index) => index,
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        &mut self.nodes[index]
    }

    /// Resolve a group reference given by id or by name
    pub fn group_id(&self, group: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|g| g.id == group || g.name.as_deref() == Some(group))
            .map(|g| g.id.as_str())
            .or_else(|| {
                self.nodes
                    .iter()
                    .filter_map(|n| n.group.as_deref())
                    .find(|g| *g == group)
            })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

/// Core trait for diagram readers
pub trait DiagramParser: Send + Sync {
    /// Parse file contents into a diagram
    fn parse(&self, input: &str) -> Result<Diagram, DiagramError>;

    /// Format this parser reads
    fn format(&self) -> DiagramFormat;

    /// Get the parser name
    fn name(&self) -> &'static str;
}

/// Core trait for recognising a diagram format from file contents
pub trait DiagramDetector: Send + Sync {
    /// Check if the input is in this detector's format
    fn detect(&self, input: &str) -> bool {
        self.confidence(input) > 0.5
    }

    /// Confidence between 0.0 and 1.0
    fn confidence(&self, input: &str) -> f64;

    fn format(&self) -> DiagramFormat;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_path() {
        assert_eq!(DiagramFormat::from_path(Path::new("a/b.mmd")), Some(DiagramFormat::Mermaid));
        assert_eq!(DiagramFormat::from_path(Path::new("b.JSON")), Some(DiagramFormat::Json));
        assert_eq!(DiagramFormat::from_path(Path::new("b.graphml")), Some(DiagramFormat::GraphMl));
        assert_eq!(DiagramFormat::from_path(Path::new("b.bpmn")), Some(DiagramFormat::Bpmn));
        assert_eq!(DiagramFormat::from_path(Path::new("b.txt")), None);
        assert_eq!(DiagramFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(DiagramFormat::from_str("Mermaid").unwrap(), DiagramFormat::Mermaid);
        assert_eq!(DiagramFormat::from_str("graphml").unwrap(), DiagramFormat::GraphMl);
        assert!(DiagramFormat::from_str("svg").is_err());
    }

    #[test]
    fn test_node_state_name() {
        let mut node = DiagramNode::new("n1");
        assert_eq!(node.state_name(), StateName::from("n1"));
        node.name = Some("draft".to_string());
        assert_eq!(node.state_name(), StateName::from("draft"));
        assert!(DiagramNode::not_exists("start").state_name().is_not_exists());
    }

    #[test]
    fn test_node_kind_aliases() {
        let node: DiagramNode = serde_json::from_str(r#"{"id": "s", "kind": "start"}"#).unwrap();
        assert_eq!(node.kind, NodeKind::NotExists);
        let node: DiagramNode = serde_json::from_str(r#"{"id": "e", "kind": "end"}"#).unwrap();
        assert_eq!(node.kind, NodeKind::NotExists);
        let node: DiagramNode = serde_json::from_str(r#"{"id": "a"}"#).unwrap();
        assert_eq!(node.kind, NodeKind::State);
    }

    #[test]
    fn test_group_lookup() {
        let mut diagram = Diagram::new();
        diagram.groups.push(DiagramGroup {
            id: "g1".to_string(),
            name: Some("Editor".to_string()),
        });
        let mut node = DiagramNode::new("a");
        node.group = Some("lane2".to_string());
        diagram.nodes.push(node);

        assert_eq!(diagram.group_id("g1"), Some("g1"));
        assert_eq!(diagram.group_id("Editor"), Some("g1"));
        assert_eq!(diagram.group_id("lane2"), Some("lane2"));
        assert_eq!(diagram.group_id("missing"), None);
    }

    #[test]
    fn test_ensure_node_keeps_first() {
        let mut diagram = Diagram::new();
        diagram.ensure_node(DiagramNode::new("a")).label = Some("A".to_string());
        diagram.ensure_node(DiagramNode::new("a"));
        assert_eq!(diagram.node_count(), 1);
        assert_eq!(diagram.nodes[0].label.as_deref(), Some("A"));
    }
}
