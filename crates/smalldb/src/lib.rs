//! Smalldb - declarative state machine definitions
//!
//! A library that assembles the definition of an entity's state machine from
//! directives declared on the entity class, extension metadata filled in by
//! preprocessors, and state diagrams included from external files.
//!
//! # Quick Start
//!
//! ```rust
//! use smalldb::build_from_json;
//!
//! let definition = build_from_json(r#"{
//!     "class": "App\\Article",
//!     "directives": [
//!         {"type": "state", "name": "draft"},
//!         {"type": "transition", "source": "", "targets": ["draft"], "name": "create"}
//!     ]
//! }"#).unwrap();
//!
//! assert_eq!(definition.machine_type(), "article");
//! assert_eq!(definition.transition_count(), 1);
//! ```
//!
//! # Advanced Usage
//!
//! For more control, drive the pipeline directly:
//!
//! ```rust
//! use std::sync::Arc;
//! use smalldb::prelude::*;
//!
//! let loader = MemoryLoader::new()
//!     .with_file("src/article.mmd", "stateDiagram-v2\n[*] --> draft : create\n");
//! let pipeline = Pipeline::with_loader(BuildConfig::default(), Arc::new(loader));
//!
//! let source = MachineSource::new("App\\Article", "src").directive(DirectiveKind::IncludeDiagram {
//!     file: "article.mmd".to_string(),
//!     format: None,
//!     group: None,
//!     svg_file: None,
//! });
//! let definition = pipeline.build(&source).unwrap();
//! assert!(definition.has_state(&StateName::from("draft")));
//! ```

pub mod core;
pub mod plugins;

pub use crate::core::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        BuildConfig, BuildError, Definition, DefinitionBuilder, Directive, DirectiveKind, DirectiveOrigin,
        FileLoader, FsLoader, MachineSource, MemoryLoader, PolicyRule, Preprocessor, PreprocessorPass,
        Provenance, StateName,
    };
    pub use crate::plugins::{
        DiagramIncludePreprocessor, DoctrineEntityPreprocessor, DtoPreprocessor, JsonDiagramParser, MermaidParser,
        Pipeline,
    };
}

/// Build a machine definition with the built-in preprocessors
///
/// Configuration comes from the `SMALLDB_*` environment variables (see
/// [`BuildConfig::from_env`]); included diagrams are read from the
/// filesystem.
pub fn build(source: &MachineSource) -> anyhow::Result<Definition> {
    let pipeline = plugins::Pipeline::with_default_preprocessors(BuildConfig::from_env());
    Ok(pipeline.build(source)?)
}

/// Parse a JSON machine source and build its definition
///
/// # Example
/// ```rust
/// let err = smalldb::build_from_json(r#"{
///     "class": "Article",
///     "directives": [{"type": "transition", "source": "", "targets": ["ghost"]}]
/// }"#).unwrap_err();
/// assert!(err.to_string().contains("ghost"));
/// ```
pub fn build_from_json(input: &str) -> anyhow::Result<Definition> {
    let source = MachineSource::from_json(input)?;
    build(&source)
}
