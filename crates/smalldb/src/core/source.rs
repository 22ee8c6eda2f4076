//! Machine source documents
//!
//! A [`MachineSource`] is everything declared on one entity class: its name,
//! the directory its relative includes resolve against, and its directives.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::directive::{Directive, DirectiveKind};
use super::types::DirectiveOrigin;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSource {
    /// Fully qualified name of the declaring class
    pub class: String,
    #[serde(default)]
    pub directory: PathBuf,
    /// Machine type; derived from the class name when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
    #[serde(default)]
    pub directives: Vec<Directive>,
}

impl MachineSource {
    pub fn new(class: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            class: class.into(),
            directory: directory.into(),
            machine_type: None,
            directives: Vec::new(),
        }
    }

    /// Parse a JSON source document and fill in missing directive origins
    pub fn from_json(input: &str) -> serde_json::Result<Self> {
        let mut source: Self = serde_json::from_str(input)?;
        source.normalize();
        Ok(source)
    }

    pub fn with_machine_type(mut self, machine_type: impl Into<String>) -> Self {
        self.machine_type = Some(machine_type.into());
        self
    }

    /// Add a directive declared on the class itself
    pub fn directive(mut self, kind: DirectiveKind) -> Self {
        let origin = DirectiveOrigin::new(&self.class, kind.default_name());
        self.directives.push(Directive::new(origin, kind));
        self
    }

    /// Add a directive declared on a class member
    pub fn member_directive(mut self, member: &str, kind: DirectiveKind) -> Self {
        let origin = DirectiveOrigin::new(&self.class, kind.default_name()).with_member(member);
        self.directives.push(Directive::new(origin, kind));
        self
    }

    /// Default the class and directive name of every origin that lacks them
    pub fn normalize(&mut self) {
        for directive in &mut self.directives {
            if directive.origin.class.is_empty() {
                directive.origin.class = self.class.clone();
            }
            if directive.origin.directive.is_empty() {
                directive.origin.directive = directive.kind.default_name().to_string();
            }
        }
    }
}
