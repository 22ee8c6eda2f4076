//! Diagram include preprocessor
//!
//! Loads the file named by an include pass, parses it with the reader
//! registered for its format, reconciles it with the builder and enqueues
//! the diagrams it includes in turn.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, span, trace, Level};

use super::{JsonDetector, JsonDiagramParser, MermaidDetector, MermaidParser};
use crate::core::{
    claim, reconcile, BuildError, DefinitionBuilder, DiagramDetector, DiagramError, DiagramFormat, DiagramParser,
    DiagramsPlaceholder, FileLoader, FsLoader, IncludeRequest, PassPayload, Preprocessor, PreprocessorPass,
    Provenance,
};

/// Preprocessor for `include_diagram` passes
pub struct DiagramIncludePreprocessor {
    loader: Arc<dyn FileLoader>,
    parsers: HashMap<DiagramFormat, Arc<dyn DiagramParser>>,
    detectors: Vec<Box<dyn DiagramDetector>>,
}

impl DiagramIncludePreprocessor {
    /// Create a preprocessor with the built-in Mermaid and JSON readers
    pub fn new(loader: Arc<dyn FileLoader>) -> Self {
        let mut preprocessor = Self {
            loader,
            parsers: HashMap::new(),
            detectors: Vec::new(),
        };
        preprocessor.register_parser(Arc::new(MermaidParser::new()));
        preprocessor.register_parser(Arc::new(JsonDiagramParser::new()));
        preprocessor.register_detector(Box::new(MermaidDetector::new()));
        preprocessor.register_detector(Box::new(JsonDetector::new()));
        preprocessor
    }

    /// Create a preprocessor reading from the local filesystem
    pub fn with_fs_loader() -> Self {
        Self::new(Arc::new(FsLoader::new()))
    }

    /// Register (or replace) the reader for a format
    pub fn register_parser(&mut self, parser: Arc<dyn DiagramParser>) {
        trace!(format = %parser.format(), parser = parser.name(), "Registering diagram parser");
        self.parsers.insert(parser.format(), parser);
    }

    pub fn register_detector(&mut self, detector: Box<dyn DiagramDetector>) {
        self.detectors.push(detector);
    }

    /// Formats a reader is registered for
    pub fn formats(&self) -> Vec<DiagramFormat> {
        let mut formats: Vec<DiagramFormat> = self.parsers.keys().copied().collect();
        formats.sort();
        formats
    }

    /// Pick a format: declared, then by file extension, then by content,
    /// then the configured fallback
    fn resolve_format(
        &self,
        request: &IncludeRequest,
        path: &Path,
        content: &str,
        fallback: Option<DiagramFormat>,
    ) -> Option<DiagramFormat> {
        request
            .format
            .or_else(|| DiagramFormat::from_path(path))
            .or_else(|| self.detect(content))
            .or(fallback)
    }

    fn detect(&self, content: &str) -> Option<DiagramFormat> {
        self.detectors
            .iter()
            .filter(|d| d.detect(content))
            .map(|d| (d.confidence(content), d.format()))
            .fold(None, |best: Option<(f64, DiagramFormat)>, candidate| match best {
                Some(best) if best.0 >= candidate.0 => Some(best),
                _ => Some(candidate),
            })
            .map(|(confidence, format)| {
                debug!(%format, confidence, "Detected diagram format");
                format
            })
    }

    fn load_error(class: &str, file: &str, source: DiagramError) -> BuildError {
        BuildError::DiagramLoad {
            class: class.to_string(),
            file: file.to_string(),
            source,
        }
    }

    /// Merge the svg file and declared format of one request into what
    /// earlier requests for the same (file, group) said
    fn record_request(
        &self,
        origin: &Provenance,
        request: &IncludeRequest,
        file: &str,
        builder: &mut DefinitionBuilder,
    ) -> Result<(), BuildError> {
        let claimed = {
            let included = builder
                .machine_extension::<DiagramsPlaceholder>()?
                .diagrams
                .entry((file.to_string(), request.group.clone()))
                .or_default();
            let svg_file = match &request.svg_file {
                Some(svg_file) => claim(&mut included.svg_file, svg_file.clone(), origin.clone())
                    .map_err(|conflict| (conflict, "svg file")),
                None => Ok(()),
            };
            svg_file.and_then(|()| match request.format {
                Some(format) => claim(&mut included.declared_format, format.to_string(), origin.clone())
                    .map_err(|conflict| (conflict, "diagram format")),
                None => Ok(()),
            })
        };
        claimed.map_err(|(conflict, role)| builder.conflict_error(conflict, format!("diagram {}", file), role))
    }

    fn include(&self, origin: &Provenance, request: IncludeRequest, builder: &mut DefinitionBuilder) -> Result<(), BuildError> {
        let base = request
            .base_dir
            .clone()
            .unwrap_or_else(|| builder.directory().to_path_buf());
        let path = self.loader.canonicalize(&base, &request.file);
        let file = path.display().to_string();
        let class = builder.class_name().to_string();

        let include_span = span!(Level::INFO, "include_diagram", file = %file, group = ?request.group);
        let _enter = include_span.enter();

        self.record_request(origin, &request, &file, builder)?;

        let content = self.loader.load(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => BuildError::FileNotFound {
                class: class.clone(),
                file: file.clone(),
            },
            _ => Self::load_error(&class, &file, e.into()),
        })?;

        let format = self
            .resolve_format(&request, &path, &content, builder.default_diagram_format())
            .ok_or_else(|| Self::load_error(&class, &file, DiagramError::UndetectedFormat))?;

        if !builder.mark_included(path.clone(), request.group.clone(), format)? {
            debug!(requested_by = %origin, %format, "Diagram already included");
            return Ok(());
        }

        let parser = self.parsers.get(&format).ok_or_else(|| {
            Self::load_error(
                &class,
                &file,
                DiagramError::UnsupportedFormat {
                    format: format.to_string(),
                },
            )
        })?;

        let diagram = parser
            .parse(&content)
            .map_err(|e| Self::load_error(&class, &file, e))?;
        let summary = reconcile(builder, &diagram, &file, request.group.as_deref())?;

        builder
            .machine_extension::<DiagramsPlaceholder>()?
            .diagrams
            .entry((file.clone(), request.group.clone()))
            .or_default()
            .formats
            .insert(format.to_string());

        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        for nested in &diagram.includes {
            builder.add_preprocessor_pass(PreprocessorPass::include_diagram(
                Provenance::derived(format!("diagram {}", file)),
                IncludeRequest {
                    file: PathBuf::from(&nested.file),
                    base_dir: Some(directory.clone()),
                    format: None,
                    group: nested.group.clone(),
                    svg_file: None,
                },
            ))?;
        }

        info!(
            %format,
            states = summary.states,
            transitions = summary.transitions,
            nested = diagram.includes.len(),
            "Diagram included"
        );
        Ok(())
    }
}

impl Preprocessor for DiagramIncludePreprocessor {
    fn name(&self) -> &'static str {
        "diagram_include"
    }

    fn supports(&self, pass: &PreprocessorPass) -> bool {
        matches!(pass.payload, PassPayload::IncludeDiagram(_))
    }

    fn preprocess(&self, pass: PreprocessorPass, builder: &mut DefinitionBuilder) -> Result<(), BuildError> {
        let kind = pass.kind();
        match pass.payload {
            PassPayload::IncludeDiagram(request) => self.include(&pass.origin, request, builder),
            _ => Err(BuildError::NoPreprocessor {
                class: builder.class_name().to_string(),
                pass: kind,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DiagramsExtension, DirectiveOrigin, MemoryLoader, StateName};

    fn include(file: &str, group: Option<&str>) -> PreprocessorPass {
        PreprocessorPass::include_diagram(
            Provenance::Direct(DirectiveOrigin::new("Article", "IncludeDiagram")),
            IncludeRequest {
                file: PathBuf::from(file),
                base_dir: None,
                format: None,
                group: group.map(str::to_string),
                svg_file: Some("article.svg".to_string()),
            },
        )
    }

    fn preprocessor(loader: MemoryLoader) -> DiagramIncludePreprocessor {
        DiagramIncludePreprocessor::new(Arc::new(loader))
    }

    #[test]
    fn test_includes_mermaid_file() {
        let loader = MemoryLoader::new().with_file("app/article.mmd", "stateDiagram-v2\n[*] --> draft : create\n");
        let mut builder = DefinitionBuilder::new("Article", "app");
        preprocessor(loader)
            .preprocess(include("article.mmd", None), &mut builder)
            .unwrap();

        assert!(builder.has_state(&StateName::from("draft")));
        let def = builder.finalize().unwrap();
        let diagrams = def.extension::<DiagramsExtension>().unwrap();
        assert_eq!(diagrams.diagrams[0].file, "app/article.mmd");
        assert_eq!(diagrams.diagrams[0].svg_file.as_deref(), Some("article.svg"));
        assert_eq!(diagrams.diagrams[0].format, "mermaid");
    }

    #[test]
    fn test_nested_includes_are_enqueued_relative_to_the_diagram() {
        let loader = MemoryLoader::new()
            .with_file("app/diagrams/main.json", r#"{"includes": [{"file": "../shared/review.mmd"}]}"#);
        let mut builder = DefinitionBuilder::new("Article", "app");
        preprocessor(loader)
            .preprocess(include("diagrams/main.json", None), &mut builder)
            .unwrap();

        let next = builder.take_next_pass().unwrap();
        match next.payload {
            PassPayload::IncludeDiagram(request) => {
                assert_eq!(request.base_dir, Some(PathBuf::from("app/diagrams")));
                assert_eq!(request.file, PathBuf::from("../shared/review.mmd"));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_repeated_include_is_a_no_op() {
        let loader = MemoryLoader::new().with_file("app/a.mmd", "stateDiagram-v2\na --> b\n");
        let preprocessor = preprocessor(loader);
        let mut builder = DefinitionBuilder::new("Article", "app");
        preprocessor.preprocess(include("a.mmd", None), &mut builder).unwrap();
        preprocessor.preprocess(include("./a.mmd", None), &mut builder).unwrap();
        assert_eq!(builder.transition_count(), 1);
    }

    fn include_with(file: &str, directive: &str, svg_file: Option<&str>, format: Option<DiagramFormat>) -> PreprocessorPass {
        PreprocessorPass::include_diagram(
            Provenance::Direct(DirectiveOrigin::new("Article", directive)),
            IncludeRequest {
                file: PathBuf::from(file),
                base_dir: None,
                format,
                group: None,
                svg_file: svg_file.map(str::to_string),
            },
        )
    }

    #[test]
    fn test_svg_file_of_a_repeated_include_is_kept() {
        for swap in [false, true] {
            let loader = MemoryLoader::new().with_file("app/a.mmd", "stateDiagram-v2\na --> b\n");
            let preprocessor = preprocessor(loader);
            let mut passes = vec![
                include_with("a.mmd", "Plain", None, None),
                include_with("a.mmd", "WithSvg", Some("a.svg"), None),
            ];
            if swap {
                passes.reverse();
            }
            let mut builder = DefinitionBuilder::new("Article", "app");
            for pass in passes {
                preprocessor.preprocess(pass, &mut builder).unwrap();
            }

            let def = builder.finalize().unwrap();
            let diagrams = &def.extension::<DiagramsExtension>().unwrap().diagrams;
            assert_eq!(diagrams.len(), 1);
            assert_eq!(diagrams[0].svg_file.as_deref(), Some("a.svg"));
        }
    }

    #[test]
    fn test_different_svg_files_for_one_include_conflict() {
        let mut messages = Vec::new();
        for swap in [false, true] {
            let loader = MemoryLoader::new().with_file("app/a.mmd", "stateDiagram-v2\na --> b\n");
            let preprocessor = preprocessor(loader);
            let mut passes = vec![
                include_with("a.mmd", "One", Some("one.svg"), None),
                include_with("./a.mmd", "Two", Some("two.svg"), None),
            ];
            if swap {
                passes.reverse();
            }
            let mut builder = DefinitionBuilder::new("Article", "app");
            let err = passes
                .into_iter()
                .try_for_each(|pass| preprocessor.preprocess(pass, &mut builder))
                .unwrap_err();
            assert_eq!(err.error_code(), "CONFLICTING_ANNOTATION");
            messages.push(err.to_string());
        }
        assert_eq!(messages[0], messages[1]);
        assert!(messages[0].contains("svg file"));
        assert!(messages[0].contains("app/a.mmd"));
    }

    #[test]
    fn test_different_declared_formats_conflict() {
        let loader = MemoryLoader::new().with_file("app/a.txt", "stateDiagram-v2\na --> b\n");
        let preprocessor = preprocessor(loader);
        let mut builder = DefinitionBuilder::new("Article", "app");
        preprocessor
            .preprocess(include_with("a.txt", "One", None, Some(DiagramFormat::Mermaid)), &mut builder)
            .unwrap();
        let err = preprocessor
            .preprocess(include_with("a.txt", "Two", None, Some(DiagramFormat::Json)), &mut builder)
            .unwrap_err();
        assert_eq!(err.error_code(), "CONFLICTING_ANNOTATION");
        assert!(err.to_string().contains("diagram format"));
    }

    #[test]
    fn test_declared_format_matching_detection_reads_once() {
        let loader = MemoryLoader::new().with_file("app/a.mmd", "stateDiagram-v2\na --> b\n");
        let preprocessor = preprocessor(loader);
        let mut builder = DefinitionBuilder::new("Article", "app");
        preprocessor
            .preprocess(include_with("a.mmd", "One", None, Some(DiagramFormat::Mermaid)), &mut builder)
            .unwrap();
        preprocessor
            .preprocess(include_with("a.mmd", "Two", None, None), &mut builder)
            .unwrap();

        let def = builder.finalize().unwrap();
        let diagrams = &def.extension::<DiagramsExtension>().unwrap().diagrams;
        assert_eq!(diagrams.len(), 1);
        assert_eq!(diagrams[0].format, "mermaid");
    }

    #[test]
    fn test_missing_file() {
        let mut builder = DefinitionBuilder::new("Article", "app");
        let err = preprocessor(MemoryLoader::new())
            .preprocess(include("missing.mmd", None), &mut builder)
            .unwrap_err();
        assert!(matches!(err, BuildError::FileNotFound { ref file, .. } if file == "app/missing.mmd"));
    }

    #[test]
    fn test_format_detected_from_content() {
        let loader = MemoryLoader::new().with_file("app/article.diagram", r#"{"nodes": [{"id": "a"}]}"#);
        let mut builder = DefinitionBuilder::new("Article", "app");
        preprocessor(loader)
            .preprocess(include("article.diagram", None), &mut builder)
            .unwrap();
        assert!(builder.has_state(&StateName::from("a")));
    }

    #[test]
    fn test_format_without_reader() {
        let loader = MemoryLoader::new().with_file("app/article.graphml", "<graphml/>");
        let mut builder = DefinitionBuilder::new("Article", "app");
        let err = preprocessor(loader)
            .preprocess(include("article.graphml", None), &mut builder)
            .unwrap_err();
        match err {
            BuildError::DiagramLoad { source, .. } => {
                assert!(matches!(source, DiagramError::UnsupportedFormat { ref format } if format == "graphml"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_error_names_file() {
        let loader = MemoryLoader::new().with_file("app/bad.mmd", "stateDiagram-v2\na -> b\n");
        let mut builder = DefinitionBuilder::new("Article", "app");
        let err = preprocessor(loader)
            .preprocess(include("bad.mmd", None), &mut builder)
            .unwrap_err();
        assert!(err.to_string().contains("app/bad.mmd"));
    }

    #[test]
    fn test_formats() {
        let preprocessor = preprocessor(MemoryLoader::new());
        assert_eq!(preprocessor.formats(), vec![DiagramFormat::Mermaid, DiagramFormat::Json]);
    }
}
