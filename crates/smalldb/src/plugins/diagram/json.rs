//! JSON diagram reader
//!
//! The document is the serde form of [`Diagram`]:
//!
//! ```json
//! {
//!   "groups": [{"id": "lane1", "name": "Editor"}],
//!   "nodes": [
//!     {"id": "s", "kind": "start"},
//!     {"id": "draft", "group": "lane1", "color": "#ccc"}
//!   ],
//!   "edges": [{"source": "s", "target": "draft", "label": "create"}],
//!   "includes": [{"file": "review.mmd", "group": "Editor"}]
//! }
//! ```

use std::collections::BTreeSet;
use tracing::debug;

use crate::core::{Diagram, DiagramError, DiagramFormat, DiagramParser};

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDiagramParser;

impl JsonDiagramParser {
    pub fn new() -> Self {
        Self
    }
}

impl DiagramParser for JsonDiagramParser {
    fn parse(&self, input: &str) -> Result<Diagram, DiagramError> {
        let diagram: Diagram = serde_json::from_str(input)?;

        let mut seen = BTreeSet::new();
        if let Some(duplicate) = diagram.nodes.iter().find(|n| !seen.insert(n.id.as_str())) {
            return Err(DiagramError::invalid_diagram(format!("duplicate node '{}'", duplicate.id)));
        }
        if let Some(edge) = diagram.edges.iter().find(|e| e.source.is_empty() || e.target.is_empty()) {
            return Err(DiagramError::invalid_diagram(format!(
                "edge '{}' -> '{}' has an empty endpoint",
                edge.source, edge.target
            )));
        }

        debug!(nodes = diagram.node_count(), edges = diagram.edge_count(), "Parsed JSON diagram");
        Ok(diagram)
    }

    fn format(&self) -> DiagramFormat {
        DiagramFormat::Json
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
