//! Declarative directives attached to an entity class
//!
//! Each directive performs its direct builder actions immediately and may
//! request one preprocessor pass for work that has to wait until every
//! direct declaration is in place.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, trace};

use super::builder::DefinitionBuilder;
use super::diagram::DiagramFormat;
use super::error::BuildError;
use super::extension::{AccessControlPlaceholder, PolicyRule, SqlColumnPlaceholder, SqlTablePlaceholder};
use super::pass::{IncludeRequest, PassPayload, PreprocessorPass};
use super::types::{claim, DirectiveOrigin, PropertyRole, Provenance, StateName};

/// What a directive declares
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectiveKind {
    State {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    /// A transition; without `source` or `targets` it only decorates
    /// complete transitions of the same name
    Transition {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        targets: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        access_policy: Option<String>,
    },
    Property {
        name: String,
        #[serde(rename = "property_type", default, skip_serializing_if = "Option::is_none")]
        type_hint: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nullable: Option<bool>,
    },
    Identifier {
        property: String,
    },
    SqlTable {
        table: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        view: Option<String>,
    },
    SqlColumn {
        property: String,
        column: String,
    },
    AccessPolicy {
        name: String,
        rule: PolicyRule,
    },
    DefaultAccessPolicy {
        name: String,
    },
    IncludeDiagram {
        file: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<DiagramFormat>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        group: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        svg_file: Option<String>,
    },
    DoctrineEntity {
        entity_class: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        table: Option<String>,
    },
    WrapDto {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        class_name: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        exclude: Vec<String>,
    },
}

impl DirectiveKind {
    /// Directive name used when the source does not give one
    pub fn default_name(&self) -> &'static str {
        match self {
            DirectiveKind::State { .. } => "State",
            DirectiveKind::Transition { .. } => "Transition",
            DirectiveKind::Property { .. } => "Property",
            DirectiveKind::Identifier { .. } => "Id",
            DirectiveKind::SqlTable { .. } => "SQL\\Table",
            DirectiveKind::SqlColumn { .. } => "SQL\\Column",
            DirectiveKind::AccessPolicy { .. } => "AccessPolicy",
            DirectiveKind::DefaultAccessPolicy { .. } => "DefaultPolicy",
            DirectiveKind::IncludeDiagram { .. } => "IncludeDiagram",
            DirectiveKind::DoctrineEntity { .. } => "DoctrineEntity",
            DirectiveKind::WrapDto { .. } => "WrapDTO",
        }
    }
}

/// An immutable declaration together with where it was made
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    #[serde(default)]
    pub origin: DirectiveOrigin,
    #[serde(flatten)]
    pub kind: DirectiveKind,
}

impl Directive {
    pub fn new(origin: DirectiveOrigin, kind: DirectiveKind) -> Self {
        Self { origin, kind }
    }

    fn direct(&self) -> Provenance {
        Provenance::Direct(self.origin.clone())
    }

    /// Perform the direct builder actions of this directive
    pub fn apply(&self, builder: &mut DefinitionBuilder) -> Result<(), BuildError> {
        trace!(directive = %self.origin, "Applying directive");
        match &self.kind {
            DirectiveKind::State { name, color, label } => {
                let state = StateName::from(name.as_str());
                builder.add_state(state.clone(), self.direct())?;
                builder.set_state_style(&state, color.as_deref(), label.as_deref(), &self.direct())
            }

            DirectiveKind::Transition {
                source,
                targets,
                name,
                color,
                access_policy,
            } => {
                let Some(source) = source.as_ref().filter(|_| !targets.is_empty()) else {
                    return match name {
                        Some(name) => builder.add_transition_decoration(
                            name,
                            color.as_deref(),
                            access_policy.as_deref(),
                            &self.origin,
                        ),
                        None => {
                            debug!(directive = %self.origin, "Ignoring unnamed incomplete transition");
                            Ok(())
                        }
                    };
                };

                let key = builder.add_transition(
                    StateName::from(source.as_str()),
                    targets.iter().map(|t| StateName::from(t.as_str())),
                )?;
                if let Some(name) = name {
                    builder.name_transition(&key, name, self.direct())?;
                }
                if let Some(color) = color {
                    builder.set_transition_color(&key, color, self.direct())?;
                }
                if let Some(policy) = access_policy {
                    builder.set_transition_policy(&key, policy, self.direct())?;
                }
                Ok(())
            }

            DirectiveKind::Property {
                name,
                type_hint,
                nullable,
            } => {
                builder.add_property(name)?;
                if let Some(type_hint) = type_hint {
                    builder.set_property_type(name, type_hint, self.direct())?;
                }
                if let Some(nullable) = nullable {
                    builder.set_property_nullable(name, *nullable, self.direct())?;
                }
                Ok(())
            }

            DirectiveKind::Identifier { property } => {
                builder.claim_property_role(property, PropertyRole::Identifier, &self.origin)
            }

            DirectiveKind::SqlTable { table, view } => {
                let placeholder = builder.machine_extension::<SqlTablePlaceholder>()?;
                let mut result = claim(&mut placeholder.table, table.clone(), self.direct()).map_err(|c| (c, "table"));
                if let (Ok(()), Some(view)) = (&result, view) {
                    result = claim(&mut placeholder.view, view.clone(), self.direct()).map_err(|c| (c, "view"));
                }
                result.map_err(|(c, role)| builder.conflict_error(c, "SQL table", role))
            }

            DirectiveKind::SqlColumn { property, column } => {
                // A mapped column makes the machine table mandatory
                builder.machine_extension::<SqlTablePlaceholder>()?;
                let placeholder = builder.property_extension_placeholder::<SqlColumnPlaceholder>(property)?;
                let result = claim(&mut placeholder.column, column.clone(), self.direct());
                result.map_err(|c| builder.conflict_error(c, format!("property '{}'", property), "SQL column"))
            }

            DirectiveKind::AccessPolicy { name, rule } => {
                let placeholder = builder.machine_extension::<AccessControlPlaceholder>()?;
                let slot = placeholder.policies.entry(name.clone()).or_default();
                let result = claim(slot, rule.clone(), self.direct());
                result.map_err(|c| builder.conflict_error(c, format!("access policy '{}'", name), "rule"))
            }

            DirectiveKind::DefaultAccessPolicy { name } => {
                let placeholder = builder.machine_extension::<AccessControlPlaceholder>()?;
                let result = claim(&mut placeholder.default_policy, name.clone(), self.direct());
                result.map_err(|c| builder.conflict_error(c, "access control", "default policy"))
            }

            DirectiveKind::IncludeDiagram { .. }
            | DirectiveKind::DoctrineEntity { .. }
            | DirectiveKind::WrapDto { .. } => Ok(()),
        }
    }

    /// The pass this directive requests, if any
    pub fn pass(&self) -> Option<PreprocessorPass> {
        let payload = match &self.kind {
            DirectiveKind::IncludeDiagram {
                file,
                format,
                group,
                svg_file,
            } => PassPayload::IncludeDiagram(IncludeRequest {
                file: PathBuf::from(file),
                base_dir: None,
                format: *format,
                group: group.clone(),
                svg_file: svg_file.clone(),
            }),
            DirectiveKind::DoctrineEntity { entity_class, table } => PassPayload::MapDoctrineEntity {
                entity_class: entity_class.clone(),
                table: table.clone(),
            },
            DirectiveKind::WrapDto { class_name, exclude } => PassPayload::GenerateDto {
                class_name: class_name.clone(),
                exclude: exclude.clone(),
            },
            _ => return None,
        };
        Some(PreprocessorPass::new(self.direct(), payload))
    }
}

/// Apply a list of directives: every direct action first, in order, then
/// every requested pass, in order
pub fn apply_directives(builder: &mut DefinitionBuilder, directives: &[Directive]) -> Result<(), BuildError> {
    for directive in directives {
        directive.apply(builder)?;
    }
    for pass in directives.iter().filter_map(Directive::pass) {
        builder.add_preprocessor_pass(pass)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extension::SqlColumnExtension;

    fn directive(directive: &str, kind: DirectiveKind) -> Directive {
        Directive::new(DirectiveOrigin::new("Article", directive), kind)
    }

    fn state(name: &str) -> Directive {
        directive(
            "State",
            DirectiveKind::State {
                name: name.to_string(),
                color: None,
                label: None,
            },
        )
    }

    fn transition(source: Option<&str>, targets: &[&str], name: Option<&str>, color: Option<&str>) -> Directive {
        directive(
            "Transition",
            DirectiveKind::Transition {
                source: source.map(str::to_string),
                targets: targets.iter().map(|t| t.to_string()).collect(),
                name: name.map(str::to_string),
                color: color.map(str::to_string),
                access_policy: None,
            },
        )
    }

    #[test]
    fn test_deserialize_directives() {
        let json = r#"[
            {"type": "state", "name": "new", "color": "green"},
            {"type": "transition", "source": "", "targets": ["new"], "name": "create"},
            {"type": "property", "name": "id", "property_type": "int"},
            {"type": "identifier", "property": "id", "origin": {"member": "id"}},
            {"type": "access_policy", "name": "editor", "rule": {"rule": "has_role", "role": "ed"}},
            {"type": "include_diagram", "file": "article.json", "group": "Editor"},
            {"type": "wrap_dto"}
        ]"#;
        let directives: Vec<Directive> = serde_json::from_str(json).unwrap();
        assert_eq!(directives.len(), 7);
        assert!(matches!(directives[1].kind, DirectiveKind::Transition { ref source, .. } if source.as_deref() == Some("")));
        assert_eq!(directives[3].origin.member.as_deref(), Some("id"));
        assert!(matches!(
            directives[4].kind,
            DirectiveKind::AccessPolicy { rule: PolicyRule::HasRole { .. }, .. }
        ));
        assert!(directives[5].pass().is_some());
        assert!(directives[0].pass().is_none());
    }

    #[test]
    fn test_passes_are_enqueued_after_direct_actions() {
        let mut builder = DefinitionBuilder::new("Article", "src");
        let directives = vec![
            directive(
                "WrapDTO",
                DirectiveKind::WrapDto {
                    class_name: None,
                    exclude: Vec::new(),
                },
            ),
            state("new"),
        ];
        apply_directives(&mut builder, &directives).unwrap();
        assert!(builder.has_direct_state(&StateName::from("new")));
        assert_eq!(builder.pending_passes(), 1);
    }

    #[test]
    fn test_incomplete_transition_becomes_decoration() {
        let mut builder = DefinitionBuilder::new("Article", "src");
        let directives = vec![
            state("a"),
            state("b"),
            transition(None, &[], Some("go"), Some("red")),
            transition(Some("a"), &["b"], Some("go"), None),
            transition(Some("a"), &[], None, None),
        ];
        apply_directives(&mut builder, &directives).unwrap();
        assert_eq!(builder.transition_count(), 1);

        let def = builder.finalize().unwrap();
        assert_eq!(def.transition("a", "go").unwrap().color(), Some("red"));
    }

    #[test]
    fn test_conflicting_direct_colors() {
        let mut builder = DefinitionBuilder::new("Article", "src");
        let directives = vec![
            state("a"),
            state("b"),
            transition(Some("a"), &["b"], None, Some("red")),
            transition(Some("a"), &["b"], None, Some("blue")),
        ];
        let err = apply_directives(&mut builder, &directives).unwrap_err();
        assert!(matches!(err, BuildError::ConflictingAnnotation { .. }));
    }

    #[test]
    fn test_sql_column_requires_table() {
        let mut builder = DefinitionBuilder::new("Article", "src");
        let directives = vec![directive(
            "Column",
            DirectiveKind::SqlColumn {
                property: "title".to_string(),
                column: "title_col".to_string(),
            },
        )];
        apply_directives(&mut builder, &directives).unwrap();
        let err = builder.finalize().unwrap_err();
        assert!(matches!(err, BuildError::IncompleteExtension { field: "table", .. }));
    }

    #[test]
    fn test_sql_mapping() {
        let mut builder = DefinitionBuilder::new("Article", "src");
        let directives = vec![
            directive(
                "Table",
                DirectiveKind::SqlTable {
                    table: "articles".to_string(),
                    view: None,
                },
            ),
            directive(
                "Column",
                DirectiveKind::SqlColumn {
                    property: "title".to_string(),
                    column: "title_col".to_string(),
                },
            ),
        ];
        apply_directives(&mut builder, &directives).unwrap();
        let def = builder.finalize().unwrap();
        let title = def.property("title").unwrap();
        assert_eq!(title.extension::<SqlColumnExtension>().unwrap().column, "title_col");
        assert_eq!(title.column(), Some("title_col"));
    }

    #[test]
    fn test_access_policy_definition() {
        let mut builder = DefinitionBuilder::new("Article", "src");
        let directives = vec![
            directive(
                "AccessPolicy",
                DirectiveKind::AccessPolicy {
                    name: "all".to_string(),
                    rule: PolicyRule::AllowAll,
                },
            ),
            directive(
                "AccessPolicy",
                DirectiveKind::AccessPolicy {
                    name: "all".to_string(),
                    rule: PolicyRule::DenyAll,
                },
            ),
        ];
        let err = apply_directives(&mut builder, &directives).unwrap_err();
        assert!(matches!(err, BuildError::ConflictingAnnotation { ref subject, .. } if subject.contains("all")));
    }
}
