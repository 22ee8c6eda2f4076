//! Frozen state machine definition
//!
//! Produced by [`DefinitionBuilder::finalize`](super::DefinitionBuilder::finalize).
//! All collections are kept in a canonical order, so two builds of the same
//! directives compare equal no matter in which order the directives came.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::extension::{
    extension_in, ExtensionMap, ExtensionVariant, SqlColumnExtension, StyleExtension,
    TransitionAccessExtension,
};
use super::types::{PropertyRole, StateName};

/// A declared state and its extensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateDefinition {
    pub name: StateName,
    #[serde(skip_serializing_if = "ExtensionMap::is_empty")]
    pub extensions: ExtensionMap,
}

impl StateDefinition {
    pub fn extension<E: ExtensionVariant>(&self) -> Option<&E> {
        extension_in(&self.extensions)
    }

    pub fn color(&self) -> Option<&str> {
        self.extension::<StyleExtension>()?.color.as_deref()
    }

    pub fn label(&self) -> Option<&str> {
        self.extension::<StyleExtension>()?.label.as_deref()
    }
}

/// A transition from one source state to a set of target states
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionDefinition {
    pub source: StateName,
    pub targets: BTreeSet<StateName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "ExtensionMap::is_empty")]
    pub extensions: ExtensionMap,
}

impl TransitionDefinition {
    pub fn extension<E: ExtensionVariant>(&self) -> Option<&E> {
        extension_in(&self.extensions)
    }

    pub fn color(&self) -> Option<&str> {
        self.extension::<StyleExtension>()?.color.as_deref()
    }

    pub fn access_policy(&self) -> Option<&str> {
        self.extension::<TransitionAccessExtension>()?.policy.as_deref()
    }

    pub fn has_target(&self, state: &StateName) -> bool {
        self.targets.contains(state)
    }
}

impl fmt::Display for TransitionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let targets: Vec<String> = self.targets.iter().map(|t| t.to_string()).collect();
        match &self.name {
            Some(name) => write!(f, "'{}' ({} -> {})", name, self.source, targets.join(", ")),
            None => write!(f, "{} -> {}", self.source, targets.join(", ")),
        }
    }
}

/// An entity property
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyDefinition {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_hint: Option<String>,
    pub nullable: bool,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub roles: BTreeSet<PropertyRole>,
    #[serde(skip_serializing_if = "ExtensionMap::is_empty")]
    pub extensions: ExtensionMap,
}

impl PropertyDefinition {
    pub fn extension<E: ExtensionVariant>(&self) -> Option<&E> {
        extension_in(&self.extensions)
    }

    pub fn is_identifier(&self) -> bool {
        self.roles.contains(&PropertyRole::Identifier)
    }

    pub fn column(&self) -> Option<&str> {
        Some(self.extension::<SqlColumnExtension>()?.column.as_str())
    }
}

/// Immutable state machine definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Definition {
    class: String,
    machine_type: String,
    states: BTreeMap<StateName, StateDefinition>,
    transitions: Vec<TransitionDefinition>,
    properties: BTreeMap<String, PropertyDefinition>,
    extensions: ExtensionMap,
}

impl Definition {
    pub(crate) fn new(
        class: String,
        machine_type: String,
        states: BTreeMap<StateName, StateDefinition>,
        mut transitions: Vec<TransitionDefinition>,
        properties: BTreeMap<String, PropertyDefinition>,
        extensions: ExtensionMap,
    ) -> Self {
        transitions.sort_by(|a, b| (&a.source, &a.targets).cmp(&(&b.source, &b.targets)));
        Self {
            class,
            machine_type,
            states,
            transitions,
            properties,
            extensions,
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn machine_type(&self) -> &str {
        &self.machine_type
    }

    /// Declared states; the not-exists pseudo-state is not listed
    pub fn states(&self) -> impl Iterator<Item = &StateDefinition> {
        self.states.values()
    }

    pub fn state_names(&self) -> BTreeSet<StateName> {
        self.states.keys().cloned().collect()
    }

    pub fn state(&self, name: &str) -> Option<&StateDefinition> {
        self.states.get(&StateName::from(name))
    }

    /// True for declared states and for the not-exists pseudo-state
    pub fn has_state(&self, name: &StateName) -> bool {
        name.is_not_exists() || self.states.contains_key(name)
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Transitions ordered by source, then by target set
    pub fn transitions(&self) -> &[TransitionDefinition] {
        &self.transitions
    }

    pub fn transitions_from<'a>(&'a self, source: &'a StateName) -> impl Iterator<Item = &'a TransitionDefinition> {
        self.transitions.iter().filter(move |t| &t.source == source)
    }

    /// Find a named transition leaving `source`
    pub fn transition(&self, source: &str, name: &str) -> Option<&TransitionDefinition> {
        self.transitions
            .iter()
            .find(|t| t.source.as_str() == source && t.name.as_deref() == Some(name))
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    /// Properties ordered by name
    pub fn properties(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.properties.values()
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.get(name)
    }

    pub fn identifier_properties(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.properties.values().filter(|p| p.is_identifier())
    }

    /// Machine-level extensions
    pub fn extensions(&self) -> &ExtensionMap {
        &self.extensions
    }

    pub fn extension<E: ExtensionVariant>(&self) -> Option<&E> {
        extension_in(&self.extensions)
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
