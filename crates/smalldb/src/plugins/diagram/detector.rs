//! Diagram format detectors
//!
//! Used for included files whose format is neither declared nor implied by
//! the file extension.

use crate::core::{DiagramDetector, DiagramFormat};

/// Detector for Mermaid state diagram syntax
#[derive(Debug, Clone, Copy, Default)]
pub struct MermaidDetector;

impl MermaidDetector {
    pub fn new() -> Self {
        Self
    }
}

impl DiagramDetector for MermaidDetector {
    fn confidence(&self, input: &str) -> f64 {
        let input_lower = input.to_lowercase();
        let trimmed = input_lower.trim_start();

        if trimmed.starts_with("statediagram") {
            return 1.0;
        }

        let has_terminal = input.contains("[*]");
        let has_transition = input.contains("-->");
        if has_terminal && has_transition {
            return 0.8;
        }
        if input_lower.contains("state ") && has_transition {
            return 0.7;
        }
        if has_transition && !trimmed.starts_with('{') && !trimmed.starts_with('<') {
            return 0.4;
        }
        0.0
    }

    fn format(&self) -> DiagramFormat {
        DiagramFormat::Mermaid
    }
}

/// Detector for JSON diagram documents
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDetector;

impl JsonDetector {
    pub fn new() -> Self {
        Self
    }
}

impl DiagramDetector for JsonDetector {
    fn confidence(&self, input: &str) -> f64 {
        let trimmed = input.trim();
        if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
            return 0.0;
        }
        if ["\"nodes\"", "\"edges\"", "\"includes\""]
            .iter()
            .any(|key| trimmed.contains(key))
        {
            1.0
        } else {
            0.6
        }
    }

    fn format(&self) -> DiagramFormat {
        DiagramFormat::Json
    }
}
