//! Diagram include plugin
//!
//! Reads diagram files referenced by `include_diagram` directives and merges
//! them into the definition being built.
//!
//! Built-in readers:
//! ```text
//! mermaid   stateDiagram-v2 text (.mmd, .mermaid)
//! json      serialized diagram document (.json)
//! ```
//!
//! GraphML and BPMN files are recognised by extension; reading them needs a
//! parser registered with
//! [`DiagramIncludePreprocessor::register_parser`].

mod detector;
mod json;
mod mermaid;
mod preprocessor;

pub use detector::{JsonDetector, MermaidDetector};
pub use json::JsonDiagramParser;
pub use mermaid::{MermaidParser, Statement};
pub use preprocessor::DiagramIncludePreprocessor;
