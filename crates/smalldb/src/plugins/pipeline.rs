//! Build pipeline for state machine definitions
//!
//! The pipeline owns the registered preprocessors and runs one build per
//! machine source: directives → builder → pass queue → finalization.

use std::sync::Arc;
use tracing::{debug, info, span, trace, warn, Level};

use super::diagram::DiagramIncludePreprocessor;
use super::doctrine::DoctrineEntityPreprocessor;
use super::dto::DtoPreprocessor;
use crate::core::{
    apply_directives, BuildConfig, BuildError, Definition, DefinitionBuilder, FileLoader, FsLoader, MachineSource,
    Preprocessor, PreprocessorPass,
};

/// Registered preprocessors plus the configuration every build uses
pub struct Pipeline {
    preprocessors: Vec<Box<dyn Preprocessor>>,
    config: BuildConfig,
}

impl Pipeline {
    /// Create an empty pipeline
    pub fn new(config: BuildConfig) -> Self {
        Self {
            preprocessors: Vec::new(),
            config,
        }
    }

    /// Create a pipeline with every built-in preprocessor, reading included
    /// diagrams from the filesystem
    pub fn with_default_preprocessors(config: BuildConfig) -> Self {
        Self::with_loader(config, Arc::new(FsLoader::new()))
    }

    /// Create a pipeline with every built-in preprocessor and a custom loader
    pub fn with_loader(config: BuildConfig, loader: Arc<dyn FileLoader>) -> Self {
        let mut pipeline = Self::new(config);
        pipeline.register(Box::new(DiagramIncludePreprocessor::new(loader)));
        pipeline.register(Box::new(DoctrineEntityPreprocessor::new()));
        pipeline.register(Box::new(DtoPreprocessor::new()));
        pipeline
    }

    /// Register a preprocessor plugin
    pub fn register(&mut self, preprocessor: Box<dyn Preprocessor>) {
        trace!(preprocessor = preprocessor.name(), "Registering preprocessor");
        self.preprocessors.push(preprocessor);
    }

    /// Get registered preprocessor names
    pub fn preprocessor_names(&self) -> Vec<&'static str> {
        self.preprocessors.iter().map(|p| p.name()).collect()
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Create a builder for `class` configured like this pipeline's builds
    pub fn builder(&self, class: &str, directory: &std::path::Path) -> DefinitionBuilder {
        DefinitionBuilder::with_config(class, directory, &self.config)
    }

    /// Find the single preprocessor supporting `pass`
    pub fn select(&self, class: &str, pass: &PreprocessorPass) -> Result<&dyn Preprocessor, BuildError> {
        let mut candidates = self.preprocessors.iter().filter(|p| p.supports(pass));
        let Some(first) = candidates.next() else {
            warn!(pass = %pass.kind(), "No preprocessor supports pass");
            return Err(BuildError::NoPreprocessor {
                class: class.to_string(),
                pass: pass.kind(),
            });
        };

        let rest: Vec<&Box<dyn Preprocessor>> = candidates.collect();
        if !rest.is_empty() {
            let mut preprocessors = vec![first.name().to_string()];
            preprocessors.extend(rest.iter().map(|p| p.name().to_string()));
            return Err(BuildError::AmbiguousPreprocessor {
                class: class.to_string(),
                pass: pass.kind(),
                preprocessors,
            });
        }
        Ok(first.as_ref())
    }

    /// Drain the builder's pass queue, breadth-first
    pub fn run_passes(&self, builder: &mut DefinitionBuilder) -> Result<usize, BuildError> {
        let mut processed = 0;
        while let Some(pass) = builder.take_next_pass() {
            let preprocessor = self.select(builder.class_name(), &pass)?;

            let pass_span = span!(Level::DEBUG, "preprocessor_pass", pass = %pass.kind(), preprocessor = preprocessor.name());
            let _enter = pass_span.enter();
            debug!(origin = %pass.origin, pending = builder.pending_passes(), "Running pass");

            preprocessor.preprocess(pass, builder)?;
            processed += 1;
        }
        Ok(processed)
    }

    /// Build the definition of one machine
    pub fn build(&self, source: &MachineSource) -> Result<Definition, BuildError> {
        let build_span = span!(Level::INFO, "build_definition", class = %source.class);
        let _enter = build_span.enter();

        info!(directives = source.directives.len(), "Starting definition build");

        let mut builder = self.builder(&source.class, &source.directory);
        if let Some(machine_type) = &source.machine_type {
            builder.set_machine_type(machine_type.clone())?;
        }

        let directives_span = span!(Level::DEBUG, "apply_directives");
        let directives_enter = directives_span.enter();
        apply_directives(&mut builder, &source.directives)?;
        debug!(passes = builder.pending_passes(), "Direct declarations applied");
        drop(directives_enter);

        let processed = self.run_passes(&mut builder)?;
        debug!(processed, "Pass queue drained");

        let definition = builder.finalize()?;
        info!(
            machine_type = definition.machine_type(),
            states = definition.state_count(),
            transitions = definition.transition_count(),
            "Build completed successfully"
        );
        Ok(definition)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::with_default_preprocessors(BuildConfig::default())
    }
}
