//! Doctrine entity mapping
//!
//! A `doctrine_entity` directive binds the machine to an ORM entity class.
//! Unless the directive names a table, the SQL table is derived from the
//! entity's short class name, so a direct `sql_table` directive wins.

use tracing::debug;

use crate::core::naming::{short_class_name, snake_case};
use crate::core::{
    claim, BuildError, DefinitionBuilder, DoctrineEntityPlaceholder, PassPayload, Preprocessor, PreprocessorPass,
    Provenance, SqlTablePlaceholder,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct DoctrineEntityPreprocessor;

impl DoctrineEntityPreprocessor {
    pub fn new() -> Self {
        Self
    }

    fn map_entity(
        &self,
        origin: Provenance,
        entity_class: String,
        table: Option<String>,
        builder: &mut DefinitionBuilder,
    ) -> Result<(), BuildError> {
        let (table, table_by) = match table {
            Some(table) => (table, origin.clone()),
            None => (
                snake_case(short_class_name(&entity_class)),
                Provenance::derived(format!("doctrine entity {}", entity_class)),
            ),
        };
        debug!(entity = %entity_class, table = %table, "Mapping Doctrine entity");

        let entity = builder.machine_extension::<DoctrineEntityPlaceholder>()?;
        let result = claim(&mut entity.entity_class, entity_class, origin);
        result.map_err(|c| builder.conflict_error(c, "Doctrine entity", "entity class"))?;

        let sql = builder.machine_extension::<SqlTablePlaceholder>()?;
        let result = claim(&mut sql.table, table, table_by);
        result.map_err(|c| builder.conflict_error(c, "SQL table", "table"))
    }
}

impl Preprocessor for DoctrineEntityPreprocessor {
    fn name(&self) -> &'static str {
        "doctrine_entity"
    }

    fn supports(&self, pass: &PreprocessorPass) -> bool {
        matches!(pass.payload, PassPayload::MapDoctrineEntity { .. })
    }

    fn preprocess(&self, pass: PreprocessorPass, builder: &mut DefinitionBuilder) -> Result<(), BuildError> {
        let kind = pass.kind();
        match pass.payload {
            PassPayload::MapDoctrineEntity { entity_class, table } => {
                self.map_entity(pass.origin, entity_class, table, builder)
            }
            _ => Err(BuildError::NoPreprocessor {
                class: builder.class_name().to_string(),
                pass: kind,
            }),
        }
    }
}
