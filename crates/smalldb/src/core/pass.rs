//! Preprocessor passes and the preprocessor trait
//!
//! A pass is a queued unit of work. Directives enqueue passes for anything
//! that must run after all direct declarations are in place (diagram
//! includes, entity mapping, DTO generation); preprocessors consume them.

use std::fmt;
use std::path::PathBuf;

use super::builder::DefinitionBuilder;
use super::diagram::DiagramFormat;
use super::error::BuildError;
use super::types::Provenance;

/// Kind tag of a pass, used to pick the preprocessor that handles it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PassKind {
    IncludeDiagram,
    MapDoctrineEntity,
    GenerateDto,
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassKind::IncludeDiagram => write!(f, "include_diagram"),
            PassKind::MapDoctrineEntity => write!(f, "map_doctrine_entity"),
            PassKind::GenerateDto => write!(f, "generate_dto"),
        }
    }
}

/// Request to merge a diagram file into the definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeRequest {
    /// File as written in the declaration
    pub file: PathBuf,
    /// Directory `file` is relative to; the declaring class directory if unset
    pub base_dir: Option<PathBuf>,
    pub format: Option<DiagramFormat>,
    /// Restrict the include to one group (participant) of the diagram
    pub group: Option<String>,
    pub svg_file: Option<String>,
}

/// Kind-specific pass data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassPayload {
    IncludeDiagram(IncludeRequest),
    MapDoctrineEntity {
        entity_class: String,
        table: Option<String>,
    },
    GenerateDto {
        class_name: Option<String>,
        exclude: Vec<String>,
    },
}

/// One queued pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessorPass {
    /// The directive or file that requested the pass
    pub origin: Provenance,
    pub payload: PassPayload,
}

impl PreprocessorPass {
    pub fn new(origin: Provenance, payload: PassPayload) -> Self {
        Self { origin, payload }
    }

    pub fn include_diagram(origin: Provenance, request: IncludeRequest) -> Self {
        Self::new(origin, PassPayload::IncludeDiagram(request))
    }

    pub fn kind(&self) -> PassKind {
        match self.payload {
            PassPayload::IncludeDiagram(_) => PassKind::IncludeDiagram,
            PassPayload::MapDoctrineEntity { .. } => PassKind::MapDoctrineEntity,
            PassPayload::GenerateDto { .. } => PassKind::GenerateDto,
        }
    }
}

/// Core trait for preprocessors
///
/// Each pass must be supported by exactly one registered preprocessor.
/// A preprocessor mutates the builder and may enqueue further passes with
/// [`DefinitionBuilder::add_preprocessor_pass`].
pub trait Preprocessor: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &'static str;

    /// Whether this preprocessor handles `pass`
    fn supports(&self, pass: &PreprocessorPass) -> bool;

    /// Consume `pass`
    fn preprocess(&self, pass: PreprocessorPass, builder: &mut DefinitionBuilder) -> Result<(), BuildError>;
}
