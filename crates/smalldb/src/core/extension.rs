//! Extension placeholders and their frozen counterparts
//!
//! During a build every extension lives as a mutable placeholder inside an
//! [`ExtensionRegistry`]. Each registry belongs to one attachment point (the
//! machine, a state, a transition or a property) and hands out the same
//! placeholder for a kind for the whole build session. At finalization the
//! registry is frozen into read-only [`Extension`] values.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::error::BuildError;
use super::types::Claim;

/// Identifier of an extension kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionKind {
    SqlTable,
    SqlColumn,
    DoctrineEntity,
    Dto,
    AccessControl,
    Diagrams,
    Style,
    TransitionAccess,
}

impl ExtensionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExtensionKind::SqlTable => "sql_table",
            ExtensionKind::SqlColumn => "sql_column",
            ExtensionKind::DoctrineEntity => "doctrine_entity",
            ExtensionKind::Dto => "dto",
            ExtensionKind::AccessControl => "access_control",
            ExtensionKind::Diagrams => "diagrams",
            ExtensionKind::Style => "style",
            ExtensionKind::TransitionAccess => "transition_access",
        }
    }

    /// Attachment points this kind may be registered on
    pub fn attachments(&self) -> &'static [Attachment] {
        match self {
            ExtensionKind::SqlTable
            | ExtensionKind::DoctrineEntity
            | ExtensionKind::Dto
            | ExtensionKind::AccessControl
            | ExtensionKind::Diagrams => &[Attachment::Machine],
            ExtensionKind::SqlColumn => &[Attachment::Property],
            ExtensionKind::Style => &[Attachment::State, Attachment::Transition],
            ExtensionKind::TransitionAccess => &[Attachment::Transition],
        }
    }

    pub fn attaches_to(&self, attachment: Attachment) -> bool {
        self.attachments().contains(&attachment)
    }
}

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Where an extension is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attachment {
    Machine,
    State,
    Transition,
    Property,
}

impl fmt::Display for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attachment::Machine => write!(f, "machine"),
            Attachment::State => write!(f, "state"),
            Attachment::Transition => write!(f, "transition"),
            Attachment::Property => write!(f, "property"),
        }
    }
}

/// Access-control rule attached to a named policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum PolicyRule {
    AllowAll,
    DenyAll,
    HasRole { role: String },
    /// The current user owns the entity; `property` holds the owner reference
    Owner { property: String },
    AllOf { rules: Vec<PolicyRule> },
    AnyOf { rules: Vec<PolicyRule> },
}

impl PolicyRule {
    /// Properties this rule (and its nested rules) refer to
    pub fn referenced_properties(&self) -> Vec<&str> {
        match self {
            PolicyRule::Owner { property } => vec![property.as_str()],
            PolicyRule::AllOf { rules } | PolicyRule::AnyOf { rules } => rules
                .iter()
                .flat_map(|rule| rule.referenced_properties())
                .collect(),
            PolicyRule::AllowAll | PolicyRule::DenyAll | PolicyRule::HasRole { .. } => Vec::new(),
        }
    }
}

/// A diagram file that contributed to the definition
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IncludedDiagram {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Visual companion of the diagram, carried as is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub svg_file: Option<String>,
    pub format: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlTablePlaceholder {
    pub table: Option<Claim<String>>,
    pub view: Option<Claim<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlColumnPlaceholder {
    pub column: Option<Claim<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DoctrineEntityPlaceholder {
    pub entity_class: Option<Claim<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DtoPlaceholder {
    pub class_name: Option<Claim<String>>,
    pub fields: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessControlPlaceholder {
    pub policies: BTreeMap<String, Option<Claim<PolicyRule>>>,
    pub default_policy: Option<Claim<String>>,
}

/// Diagrams included so far, keyed by (file, group)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagramsPlaceholder {
    pub diagrams: BTreeMap<(String, Option<String>), IncludedDiagramPlaceholder>,
}

/// Attributes collected from every request to include one (file, group)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludedDiagramPlaceholder {
    pub svg_file: Option<Claim<String>>,
    /// Format named by the requests themselves
    pub declared_format: Option<Claim<String>>,
    /// Formats the file was actually read with
    pub formats: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StylePlaceholder {
    pub color: Option<Claim<String>>,
    pub label: Option<Claim<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionAccessPlaceholder {
    pub policy: Option<Claim<String>>,
}

/// In-progress extension data, one variant per [`ExtensionKind`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionPlaceholder {
    SqlTable(SqlTablePlaceholder),
    SqlColumn(SqlColumnPlaceholder),
    DoctrineEntity(DoctrineEntityPlaceholder),
    Dto(DtoPlaceholder),
    AccessControl(AccessControlPlaceholder),
    Diagrams(DiagramsPlaceholder),
    Style(StylePlaceholder),
    TransitionAccess(TransitionAccessPlaceholder),
}

impl ExtensionPlaceholder {
    /// A fresh, zero-valued placeholder of the given kind
    pub fn new(kind: ExtensionKind) -> Self {
        match kind {
            ExtensionKind::SqlTable => Self::SqlTable(Default::default()),
            ExtensionKind::SqlColumn => Self::SqlColumn(Default::default()),
            ExtensionKind::DoctrineEntity => Self::DoctrineEntity(Default::default()),
            ExtensionKind::Dto => Self::Dto(Default::default()),
            ExtensionKind::AccessControl => Self::AccessControl(Default::default()),
            ExtensionKind::Diagrams => Self::Diagrams(Default::default()),
            ExtensionKind::Style => Self::Style(Default::default()),
            ExtensionKind::TransitionAccess => Self::TransitionAccess(Default::default()),
        }
    }

    pub fn kind(&self) -> ExtensionKind {
        match self {
            Self::SqlTable(_) => ExtensionKind::SqlTable,
            Self::SqlColumn(_) => ExtensionKind::SqlColumn,
            Self::DoctrineEntity(_) => ExtensionKind::DoctrineEntity,
            Self::Dto(_) => ExtensionKind::Dto,
            Self::AccessControl(_) => ExtensionKind::AccessControl,
            Self::Diagrams(_) => ExtensionKind::Diagrams,
            Self::Style(_) => ExtensionKind::Style,
            Self::TransitionAccess(_) => ExtensionKind::TransitionAccess,
        }
    }

    /// Name of the first required field left unset, if any
    pub fn missing_field(&self) -> Option<&'static str> {
        match self {
            Self::SqlTable(p) if p.table.is_none() => Some("table"),
            Self::SqlColumn(p) if p.column.is_none() => Some("column"),
            Self::DoctrineEntity(p) if p.entity_class.is_none() => Some("entity_class"),
            Self::Dto(p) if p.class_name.is_none() => Some("class_name"),
            Self::AccessControl(p) if p.policies.values().any(Option::is_none) => Some("rule"),
            _ => None,
        }
    }

    /// Copy the placeholder into its read-only form.
    ///
    /// Returns `None` when [`missing_field`](Self::missing_field) would.
    pub fn freeze(&self) -> Option<Extension> {
        fn value<T: Clone>(claim: &Option<Claim<T>>) -> Option<T> {
            claim.as_ref().map(|c| c.value().clone())
        }

        let extension = match self {
            Self::SqlTable(p) => Extension::SqlTable(SqlTableExtension {
                table: value(&p.table)?,
                view: value(&p.view),
            }),
            Self::SqlColumn(p) => Extension::SqlColumn(SqlColumnExtension {
                column: value(&p.column)?,
            }),
            Self::DoctrineEntity(p) => Extension::DoctrineEntity(DoctrineEntityExtension {
                entity_class: value(&p.entity_class)?,
            }),
            Self::Dto(p) => Extension::Dto(DtoExtension {
                class_name: value(&p.class_name)?,
                fields: p.fields.iter().cloned().collect(),
            }),
            Self::AccessControl(p) => {
                let mut policies = BTreeMap::new();
                for (name, rule) in &p.policies {
                    policies.insert(name.clone(), value(rule)?);
                }
                Extension::AccessControl(AccessControlExtension {
                    policies,
                    default_policy: value(&p.default_policy),
                })
            }
            Self::Diagrams(p) => Extension::Diagrams(DiagramsExtension {
                diagrams: p
                    .diagrams
                    .iter()
                    .flat_map(|((file, group), included)| {
                        included.formats.iter().map(move |format| IncludedDiagram {
                            file: file.clone(),
                            group: group.clone(),
                            svg_file: value(&included.svg_file),
                            format: format.clone(),
                        })
                    })
                    .collect(),
            }),
            Self::Style(p) => Extension::Style(StyleExtension {
                color: value(&p.color),
                label: value(&p.label),
            }),
            Self::TransitionAccess(p) => Extension::TransitionAccess(TransitionAccessExtension {
                policy: value(&p.policy),
            }),
        };
        Some(extension)
    }
}

/// Typed access to one placeholder variant
pub trait PlaceholderVariant: Sized {
    const KIND: ExtensionKind;

    fn downcast(placeholder: &ExtensionPlaceholder) -> Option<&Self>;

    fn downcast_mut(placeholder: &mut ExtensionPlaceholder) -> Option<&mut Self>;
}

macro_rules! placeholder_variant {
    ($ty:ident, $variant:ident) => {
        impl PlaceholderVariant for $ty {
            const KIND: ExtensionKind = ExtensionKind::$variant;

            fn downcast(placeholder: &ExtensionPlaceholder) -> Option<&Self> {
                match placeholder {
                    ExtensionPlaceholder::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn downcast_mut(placeholder: &mut ExtensionPlaceholder) -> Option<&mut Self> {
                match placeholder {
                    ExtensionPlaceholder::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

placeholder_variant!(SqlTablePlaceholder, SqlTable);
placeholder_variant!(SqlColumnPlaceholder, SqlColumn);
placeholder_variant!(DoctrineEntityPlaceholder, DoctrineEntity);
placeholder_variant!(DtoPlaceholder, Dto);
placeholder_variant!(AccessControlPlaceholder, AccessControl);
placeholder_variant!(DiagramsPlaceholder, Diagrams);
placeholder_variant!(StylePlaceholder, Style);
placeholder_variant!(TransitionAccessPlaceholder, TransitionAccess);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlTableExtension {
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlColumnExtension {
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoctrineEntityExtension {
    pub entity_class: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DtoExtension {
    pub class_name: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessControlExtension {
    pub policies: BTreeMap<String, PolicyRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_policy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagramsExtension {
    pub diagrams: Vec<IncludedDiagram>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StyleExtension {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionAccessExtension {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
}

/// Frozen, read-only extension data
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Extension {
    SqlTable(SqlTableExtension),
    SqlColumn(SqlColumnExtension),
    DoctrineEntity(DoctrineEntityExtension),
    Dto(DtoExtension),
    AccessControl(AccessControlExtension),
    Diagrams(DiagramsExtension),
    Style(StyleExtension),
    TransitionAccess(TransitionAccessExtension),
}

/// Typed access to one frozen extension variant
pub trait ExtensionVariant: Sized {
    const KIND: ExtensionKind;

    fn downcast(extension: &Extension) -> Option<&Self>;
}

macro_rules! extension_variant {
    ($ty:ident, $variant:ident) => {
        impl ExtensionVariant for $ty {
            const KIND: ExtensionKind = ExtensionKind::$variant;

            fn downcast(extension: &Extension) -> Option<&Self> {
                match extension {
                    Extension::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

extension_variant!(SqlTableExtension, SqlTable);
extension_variant!(SqlColumnExtension, SqlColumn);
extension_variant!(DoctrineEntityExtension, DoctrineEntity);
extension_variant!(DtoExtension, Dto);
extension_variant!(AccessControlExtension, AccessControl);
extension_variant!(DiagramsExtension, Diagrams);
extension_variant!(StyleExtension, Style);
extension_variant!(TransitionAccessExtension, TransitionAccess);

/// Frozen extensions of one attachment point
pub type ExtensionMap = BTreeMap<ExtensionKind, Extension>;

/// Typed lookup in an [`ExtensionMap`]
pub fn extension_in<E: ExtensionVariant>(map: &ExtensionMap) -> Option<&E> {
    map.get(&E::KIND).and_then(E::downcast)
}

/// Placeholders registered on one attachment point during a build
#[derive(Debug, Clone)]
pub struct ExtensionRegistry {
    owner: String,
    attachment: Attachment,
    placeholders: BTreeMap<ExtensionKind, ExtensionPlaceholder>,
}

impl ExtensionRegistry {
    /// Create an empty registry; `owner` names the attachment in errors
    pub fn new(owner: impl Into<String>, attachment: Attachment) -> Self {
        Self {
            owner: owner.into(),
            attachment,
            placeholders: BTreeMap::new(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn attachment(&self) -> Attachment {
        self.attachment
    }

    /// Return the placeholder for `kind`, creating and registering it on
    /// first use.
    pub fn get_or_create(&mut self, kind: ExtensionKind) -> Result<&mut ExtensionPlaceholder, BuildError> {
        if !kind.attaches_to(self.attachment) {
            return Err(self.misplaced(kind));
        }
        Ok(self
            .placeholders
            .entry(kind)
            .or_insert_with(|| ExtensionPlaceholder::new(kind)))
    }

    /// Typed form of [`get_or_create`](Self::get_or_create)
    pub fn get_or_create_typed<P: PlaceholderVariant>(&mut self) -> Result<&mut P, BuildError> {
        let misplaced = self.misplaced(P::KIND);
        let placeholder = self.get_or_create(P::KIND)?;
        P::downcast_mut(placeholder).ok_or(misplaced)
    }

    pub fn get(&self, kind: ExtensionKind) -> Option<&ExtensionPlaceholder> {
        self.placeholders.get(&kind)
    }

    pub fn get_typed<P: PlaceholderVariant>(&self) -> Option<&P> {
        self.placeholders.get(&P::KIND).and_then(P::downcast)
    }

    pub fn contains(&self, kind: ExtensionKind) -> bool {
        self.placeholders.contains_key(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = ExtensionKind> + '_ {
        self.placeholders.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.placeholders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placeholders.is_empty()
    }

    /// Freeze every registered placeholder.
    ///
    /// Fails on the first placeholder (in kind order) with an unset
    /// required field.
    pub fn freeze_all(&self) -> Result<ExtensionMap, BuildError> {
        let mut frozen = ExtensionMap::new();
        for (kind, placeholder) in &self.placeholders {
            let extension = placeholder.freeze().ok_or_else(|| BuildError::IncompleteExtension {
                owner: self.owner.clone(),
                kind: *kind,
                field: placeholder.missing_field().unwrap_or("value"),
            })?;
            frozen.insert(*kind, extension);
        }
        Ok(frozen)
    }

    fn misplaced(&self, kind: ExtensionKind) -> BuildError {
        BuildError::MisplacedExtension {
            owner: self.owner.clone(),
            kind,
            attachment: self.attachment,
        }
    }
}
