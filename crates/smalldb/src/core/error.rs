//! Core error types for definition building
//!
//! `BuildError` covers everything that can abort a build session.
//! `DiagramError` is produced by diagram parsers and gets wrapped into
//! `BuildError::DiagramLoad` together with the including class and file.

use thiserror::Error;

use super::extension::{Attachment, ExtensionKind};
use super::pass::PassKind;

/// Errors raised while parsing an included diagram
#[derive(Error, Debug)]
pub enum DiagramError {
    #[error("Parse error: {message} at line {line}, column {column}")]
    ParseError {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("Invalid diagram: {message}")]
    InvalidDiagram { message: String },

    #[error("Unsupported diagram format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Could not detect diagram format")]
    UndetectedFormat,

    #[error("JSON error: {source}")]
    JsonError {
        #[from]
        source: serde_json::Error,
    },

    #[error("IO error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

impl DiagramError {
    /// Create a new parse error
    pub fn parse_error(message: String, line: usize, column: usize) -> Self {
        Self::ParseError {
            message,
            line,
            column,
        }
    }

    /// Create a new invalid diagram error
    pub fn invalid_diagram(message: String) -> Self {
        Self::InvalidDiagram { message }
    }
}

/// Errors that abort a build session
///
/// There is no partial result: a build either yields a complete, validated
/// definition or one of these.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("{class}: conflicting {role} on {subject}: declared by {first} and by {second}")]
    ConflictingAnnotation {
        class: String,
        subject: String,
        role: String,
        first: String,
        second: String,
    },

    #[error("{class}: no preprocessor supports pass {pass}")]
    NoPreprocessor { class: String, pass: PassKind },

    #[error("{class}: pass {pass} is claimed by several preprocessors: {preprocessors:?}")]
    AmbiguousPreprocessor {
        class: String,
        pass: PassKind,
        preprocessors: Vec<String>,
    },

    #[error("{class}: transition {transition} uses undeclared state '{state}'")]
    UndeclaredState {
        class: String,
        state: String,
        transition: String,
    },

    #[error("{class}: transition from '{source_state}' has no target states")]
    EmptyTransitionTargets { class: String, source_state: String },

    #[error("{class}: incomplete transition '{name}' has no source or targets and nothing completes it")]
    IncompleteTransition { class: String, name: String },

    #[error("{class}: diagram {file} references unknown node '{node}'")]
    UnknownDiagramNode {
        class: String,
        file: String,
        node: String,
    },

    #[error("{class}: diagram {file} has no group '{group}'")]
    UnknownDiagramGroup {
        class: String,
        file: String,
        group: String,
    },

    #[error("{class}: diagram {file} draws transition '{name}' from '{source_state}' to {diagram_targets:?}, but it is declared with targets {declared_targets:?}")]
    DiagramMismatch {
        class: String,
        file: String,
        source_state: String,
        name: String,
        declared_targets: Vec<String>,
        diagram_targets: Vec<String>,
    },

    #[error("{owner}: extension {kind} is incomplete, '{field}' is not set")]
    IncompleteExtension {
        owner: String,
        kind: ExtensionKind,
        field: &'static str,
    },

    #[error("{owner}: extension {kind} cannot be attached to a {attachment}")]
    MisplacedExtension {
        owner: String,
        kind: ExtensionKind,
        attachment: Attachment,
    },

    #[error("{class}: transitions '{name}' from '{source_state}' disagree on {role}: {first:?} vs {second:?}")]
    ContradictoryTransitions {
        class: String,
        source_state: String,
        name: String,
        role: &'static str,
        first: String,
        second: String,
    },

    #[error("{class}: {user} refers to undefined access policy '{policy}'")]
    UnknownAccessPolicy {
        class: String,
        policy: String,
        user: String,
    },

    #[error("{class}: {user} refers to undeclared property '{property}'")]
    UnknownProperty {
        class: String,
        property: String,
        user: String,
    },

    #[error("{class}: file not found: {file}")]
    FileNotFound { class: String, file: String },

    #[error("{class}: failed to load diagram {file}: {source}")]
    DiagramLoad {
        class: String,
        file: String,
        #[source]
        source: DiagramError,
    },

    #[error("{class}: definition builder is frozen")]
    BuilderFrozen { class: String },
}

impl BuildError {
    /// Returns the short machine-readable name of this error
    pub fn error_code(&self) -> &'static str {
        match self {
            BuildError::ConflictingAnnotation { .. } => "CONFLICTING_ANNOTATION",
            BuildError::NoPreprocessor { .. } => "NO_PREPROCESSOR",
            BuildError::AmbiguousPreprocessor { .. } => "AMBIGUOUS_PREPROCESSOR",
            BuildError::UndeclaredState { .. } => "UNDECLARED_STATE",
            BuildError::EmptyTransitionTargets { .. } => "EMPTY_TRANSITION_TARGETS",
            BuildError::IncompleteTransition { .. } => "INCOMPLETE_TRANSITION",
            BuildError::UnknownDiagramNode { .. } => "UNKNOWN_DIAGRAM_NODE",
            BuildError::UnknownDiagramGroup { .. } => "UNKNOWN_DIAGRAM_GROUP",
            BuildError::DiagramMismatch { .. } => "DIAGRAM_MISMATCH",
            BuildError::IncompleteExtension { .. } => "INCOMPLETE_EXTENSION",
            BuildError::MisplacedExtension { .. } => "MISPLACED_EXTENSION",
            BuildError::ContradictoryTransitions { .. } => "CONTRADICTORY_TRANSITIONS",
            BuildError::UnknownAccessPolicy { .. } => "UNKNOWN_ACCESS_POLICY",
            BuildError::UnknownProperty { .. } => "UNKNOWN_PROPERTY",
            BuildError::FileNotFound { .. } => "FILE_NOT_FOUND",
            BuildError::DiagramLoad { .. } => "DIAGRAM_LOAD",
            BuildError::BuilderFrozen { .. } => "BUILDER_FROZEN",
        }
    }

    /// Returns true for errors caused by a broken preprocessor registration
    /// rather than by the build input.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            BuildError::NoPreprocessor { .. }
                | BuildError::AmbiguousPreprocessor { .. }
                | BuildError::BuilderFrozen { .. }
        )
    }
}
