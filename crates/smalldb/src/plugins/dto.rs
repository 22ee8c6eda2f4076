//! DTO generation metadata
//!
//! A `wrap_dto` directive asks for a data-transfer class carrying the
//! entity's properties. Only the metadata is produced: the class name and
//! the property list; generating code from it is up to the caller.

use std::collections::BTreeSet;
use tracing::debug;

use crate::core::naming::short_class_name;
use crate::core::{
    claim, BuildError, DefinitionBuilder, DtoPlaceholder, PassPayload, Preprocessor, PreprocessorPass, Provenance,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct DtoPreprocessor;

impl DtoPreprocessor {
    pub fn new() -> Self {
        Self
    }

    fn generate(
        &self,
        origin: Provenance,
        class_name: Option<String>,
        exclude: Vec<String>,
        builder: &mut DefinitionBuilder,
    ) -> Result<(), BuildError> {
        let (class_name, by) = match class_name {
            Some(name) => (name, origin),
            None => {
                let name = format!("{}Data", short_class_name(builder.class_name()));
                (name, Provenance::derived("generated DTO name"))
            }
        };

        let exclude: BTreeSet<String> = exclude.into_iter().collect();
        let fields: Vec<String> = builder
            .property_names()
            .filter(|p| !exclude.contains(*p))
            .map(str::to_string)
            .collect();
        for unknown in exclude.iter().filter(|e| !builder.has_property(e)) {
            debug!(property = %unknown, "Excluded property is not declared");
        }
        debug!(class_name = %class_name, fields = fields.len(), "Generating DTO");

        let dto = builder.machine_extension::<DtoPlaceholder>()?;
        dto.fields.extend(fields);
        let result = claim(&mut dto.class_name, class_name, by);
        result.map_err(|c| builder.conflict_error(c, "DTO", "class name"))
    }
}

impl Preprocessor for DtoPreprocessor {
    fn name(&self) -> &'static str {
        "dto"
    }

    fn supports(&self, pass: &PreprocessorPass) -> bool {
        matches!(pass.payload, PassPayload::GenerateDto { .. })
    }

    fn preprocess(&self, pass: PreprocessorPass, builder: &mut DefinitionBuilder) -> Result<(), BuildError> {
        let kind = pass.kind();
        match pass.payload {
            PassPayload::GenerateDto { class_name, exclude } => self.generate(pass.origin, class_name, exclude, builder),
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
    use crate::core::{DirectiveOrigin, DtoExtension};

    fn pass(class_name: Option<&str>, exclude: &[&str]) -> PreprocessorPass {
        PreprocessorPass::new(
            Provenance::Direct(DirectiveOrigin::new("App\\Article", "WrapDTO")),
            PassPayload::GenerateDto {
                class_name: class_name.map(str::to_string),
                exclude: exclude.iter().map(|e| e.to_string()).collect(),
            },
        )
    }

    fn builder() -> DefinitionBuilder {
        let mut builder = DefinitionBuilder::new("App\\Article", "src");
        for property in ["id", "title", "secret"] {
            builder.add_property(property).unwrap();
        }
        builder
    }

    #[test]
    fn test_default_class_name_and_fields() {
        let mut builder = builder();
        DtoPreprocessor::new()
            .preprocess(pass(None, &["secret", "unknown"]), &mut builder)
            .unwrap();

        let def = builder.finalize().unwrap();
        let dto = def.extension::<DtoExtension>().unwrap();
        assert_eq!(dto.class_name, "ArticleData");
        assert_eq!(dto.fields, vec!["id".to_string(), "title".to_string()]);
    }

    #[test]
    fn test_explicit_class_name() {
        let mut builder = builder();
        DtoPreprocessor::new()
            .preprocess(pass(Some("ArticleView"), &[]), &mut builder)
            .unwrap();
        let def = builder.finalize().unwrap();
        assert_eq!(def.extension::<DtoExtension>().unwrap().class_name, "ArticleView");
        assert_eq!(def.extension::<DtoExtension>().unwrap().fields.len(), 3);
    }

    #[test]
    fn test_explicit_name_beats_generated_one() {
        let mut builder = builder();
        let preprocessor = DtoPreprocessor::new();
        preprocessor.preprocess(pass(None, &[]), &mut builder).unwrap();
        preprocessor.preprocess(pass(Some("ArticleView"), &[]), &mut builder).unwrap();
        let def = builder.finalize().unwrap();
        assert_eq!(def.extension::<DtoExtension>().unwrap().class_name, "ArticleView");
    }
}
