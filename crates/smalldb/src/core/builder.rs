//! Mutable state machine definition builder
//!
//! The builder accumulates states, transitions, properties and extension
//! placeholders for one build session, owns the queue of pending
//! preprocessor passes, and freezes everything into a [`Definition`].

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, span, trace, warn, Level};

use super::config::BuildConfig;
use super::definition::{Definition, PropertyDefinition, StateDefinition, TransitionDefinition};
use super::diagram::DiagramFormat;
use super::error::BuildError;
use super::extension::{
    Attachment, ExtensionKind, ExtensionPlaceholder, ExtensionRegistry, PlaceholderVariant,
    StylePlaceholder, TransitionAccessPlaceholder,
};
use super::pass::PreprocessorPass;
use super::types::{claim, Claim, ClaimConflict, DirectiveOrigin, PropertyRole, Provenance, StateName};
use super::validation;

/// Identity of a transition: its source and full target set
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransitionKey {
    pub source: StateName,
    pub targets: BTreeSet<StateName>,
}

impl TransitionKey {
    pub fn new(source: StateName, targets: impl IntoIterator<Item = StateName>) -> Self {
        Self {
            source,
            targets: targets.into_iter().collect(),
        }
    }

    /// All states this transition touches
    pub fn states(&self) -> impl Iterator<Item = &StateName> {
        std::iter::once(&self.source).chain(self.targets.iter())
    }
}

impl fmt::Display for TransitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let targets: Vec<String> = self.targets.iter().map(|t| t.to_string()).collect();
        write!(f, "{} -> {}", self.source, targets.join(", "))
    }
}

#[derive(Debug, Clone)]
struct StateRecord {
    provenance: Provenance,
    extensions: ExtensionRegistry,
}

#[derive(Debug, Clone)]
struct TransitionRecord {
    name: Option<Claim<String>>,
    extensions: ExtensionRegistry,
}

#[derive(Debug, Clone)]
struct PropertyRecord {
    type_hint: Option<Claim<String>>,
    nullable: Option<Claim<bool>>,
    roles: BTreeMap<PropertyRole, DirectiveOrigin>,
    extensions: ExtensionRegistry,
}

/// Attributes of an incomplete transition declaration, applied to every
/// complete transition of the same name at finalization
#[derive(Debug, Clone, Default)]
struct TransitionDecoration {
    color: Option<Claim<String>>,
    access_policy: Option<Claim<String>>,
    origins: BTreeSet<DirectiveOrigin>,
}

/// Builder for one state machine definition
#[derive(Debug)]
pub struct DefinitionBuilder {
    class: String,
    directory: PathBuf,
    machine_type: String,
    drop_incomplete_transitions: bool,
    default_diagram_format: Option<DiagramFormat>,
    states: BTreeMap<StateName, StateRecord>,
    transitions: BTreeMap<TransitionKey, TransitionRecord>,
    decorations: BTreeMap<String, TransitionDecoration>,
    properties: BTreeMap<String, PropertyRecord>,
    extensions: ExtensionRegistry,
    passes: VecDeque<PreprocessorPass>,
    included: BTreeSet<(PathBuf, Option<String>, DiagramFormat)>,
    frozen: bool,
}

impl DefinitionBuilder {
    /// Create a builder with the default configuration
    pub fn new(class: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self::with_config(class, directory, &BuildConfig::default())
    }

    pub fn with_config(class: impl Into<String>, directory: impl Into<PathBuf>, config: &BuildConfig) -> Self {
        let class = class.into();
        let directory = config.class_directory(&directory.into());
        Self {
            machine_type: super::naming::machine_type_of(&class),
            extensions: ExtensionRegistry::new(format!("machine {}", class), Attachment::Machine),
            class,
            directory,
            drop_incomplete_transitions: config.drop_incomplete_transitions,
            default_diagram_format: config.default_diagram_format,
            states: BTreeMap::new(),
            transitions: BTreeMap::new(),
            decorations: BTreeMap::new(),
            properties: BTreeMap::new(),
            passes: VecDeque::new(),
            included: BTreeSet::new(),
            frozen: false,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class
    }

    /// Directory relative includes of the class resolve against
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn machine_type(&self) -> &str {
        &self.machine_type
    }

    pub fn set_machine_type(&mut self, machine_type: impl Into<String>) -> Result<(), BuildError> {
        self.ensure_mutable()?;
        self.machine_type = machine_type.into();
        Ok(())
    }

    pub fn default_diagram_format(&self) -> Option<DiagramFormat> {
        self.default_diagram_format
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn ensure_mutable(&self) -> Result<(), BuildError> {
        if self.frozen {
            return Err(BuildError::BuilderFrozen {
                class: self.class.clone(),
            });
        }
        Ok(())
    }

    fn conflict(&self, conflict: ClaimConflict, subject: impl Into<String>, role: &str) -> BuildError {
        conflict.into_error(&self.class, subject, role)
    }

    // =========================================================================
    // States
    // =========================================================================

    /// Declare a state. Idempotent; a direct declaration takes over a state
    /// first discovered in a diagram. The not-exists pseudo-state is implicit.
    pub fn add_state(&mut self, name: StateName, by: Provenance) -> Result<(), BuildError> {
        self.ensure_mutable()?;
        if name.is_not_exists() {
            return Ok(());
        }

        match self.states.get_mut(&name) {
            Some(record) => {
                if by.is_direct() && !record.provenance.is_direct() {
                    record.provenance = by;
                }
            }
            None => {
                trace!(state = %name, source = %by, "Adding state");
                let extensions = ExtensionRegistry::new(format!("state '{}'", name), Attachment::State);
                self.states.insert(
                    name,
                    StateRecord {
                        provenance: by,
                        extensions,
                    },
                );
            }
        }
        Ok(())
    }

    /// True for declared or discovered states and for the not-exists pseudo-state
    pub fn has_state(&self, name: &StateName) -> bool {
        name.is_not_exists() || self.states.contains_key(name)
    }

    /// True if the state was declared directly on the class
    pub fn has_direct_state(&self, name: &StateName) -> bool {
        name.is_not_exists() || self.states.get(name).is_some_and(|s| s.provenance.is_direct())
    }

    pub fn state_names(&self) -> impl Iterator<Item = &StateName> {
        self.states.keys()
    }

    pub fn state_extension_placeholder<P: PlaceholderVariant>(&mut self, state: &StateName) -> Result<&mut P, BuildError> {
        self.ensure_mutable()?;
        let class = self.class.clone();
        match self.states.get_mut(state) {
            Some(record) => record.extensions.get_or_create_typed::<P>(),
            None => Err(BuildError::UndeclaredState {
                class,
                state: state.to_string(),
                transition: "state extension".to_string(),
            }),
        }
    }

    /// Set the color and label of a state
    pub fn set_state_style(
        &mut self,
        state: &StateName,
        color: Option<&str>,
        label: Option<&str>,
        by: &Provenance,
    ) -> Result<(), BuildError> {
        if color.is_none() && label.is_none() {
            return Ok(());
        }
        let subject = format!("state '{}'", state);
        let style = self.state_extension_placeholder::<StylePlaceholder>(state)?;
        let mut result = Ok(());
        if let Some(color) = color {
            result = claim(&mut style.color, color.to_string(), by.clone()).map_err(|c| (c, "color"));
        }
        if let (Ok(()), Some(label)) = (&result, label) {
            result = claim(&mut style.label, label.to_string(), by.clone()).map_err(|c| (c, "label"));
        }
        result.map_err(|(c, role)| self.conflict(c, subject, role))
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Add a transition, or return the existing one with the same source and
    /// target set
    pub fn add_transition(
        &mut self,
        source: StateName,
        targets: impl IntoIterator<Item = StateName>,
    ) -> Result<TransitionKey, BuildError> {
        self.ensure_mutable()?;
        let key = TransitionKey::new(source, targets);
        if key.targets.is_empty() {
            return Err(BuildError::EmptyTransitionTargets {
                class: self.class.clone(),
                source_state: key.source.to_string(),
            });
        }

        if !self.transitions.contains_key(&key) {
            trace!(transition = %key, "Adding transition");
            let extensions = ExtensionRegistry::new(format!("transition {}", key), Attachment::Transition);
            self.transitions.insert(
                key.clone(),
                TransitionRecord {
                    name: None,
                    extensions,
                },
            );
        }
        Ok(key)
    }

    pub fn has_transition(&self, key: &TransitionKey) -> bool {
        self.transitions.contains_key(key)
    }

    pub fn transition_keys(&self) -> impl Iterator<Item = &TransitionKey> {
        self.transitions.keys()
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    pub fn transition_name(&self, key: &TransitionKey) -> Option<&str> {
        self.transitions
            .get(key)?
            .name
            .as_ref()
            .map(|c| c.value().as_str())
    }

    /// Target sets of directly named transitions `name` leaving `source`
    pub fn direct_targets_of(&self, source: &StateName, name: &str) -> Vec<&BTreeSet<StateName>> {
        self.transitions
            .iter()
            .filter(|(key, record)| {
                &key.source == source
                    && record
                        .name
                        .as_ref()
                        .is_some_and(|c| c.value() == name && c.provenance().is_direct())
            })
            .map(|(key, _)| &key.targets)
            .collect()
    }

    fn transition_record(&mut self, key: &TransitionKey) -> Result<&mut TransitionRecord, BuildError> {
        self.ensure_mutable()?;
        let class = self.class.clone();
        self.transitions
            .get_mut(key)
            .ok_or_else(|| BuildError::UndeclaredState {
                class,
                state: key.source.to_string(),
                transition: format!("unknown transition {}", key),
            })
    }

    pub fn name_transition(&mut self, key: &TransitionKey, name: &str, by: Provenance) -> Result<(), BuildError> {
        let record = self.transition_record(key)?;
        let result = claim(&mut record.name, name.to_string(), by);
        result.map_err(|c| self.conflict(c, format!("transition {}", key), "name"))
    }

    pub fn transition_extension_placeholder<P: PlaceholderVariant>(&mut self, key: &TransitionKey) -> Result<&mut P, BuildError> {
        self.transition_record(key)?.extensions.get_or_create_typed::<P>()
    }

    pub fn set_transition_color(&mut self, key: &TransitionKey, color: &str, by: Provenance) -> Result<(), BuildError> {
        let style = self.transition_extension_placeholder::<StylePlaceholder>(key)?;
        let result = claim(&mut style.color, color.to_string(), by);
        result.map_err(|c| self.conflict(c, format!("transition {}", key), "color"))
    }

    pub fn set_transition_policy(&mut self, key: &TransitionKey, policy: &str, by: Provenance) -> Result<(), BuildError> {
        let access = self.transition_extension_placeholder::<TransitionAccessPlaceholder>(key)?;
        let result = claim(&mut access.policy, policy.to_string(), by);
        result.map_err(|c| self.conflict(c, format!("transition {}", key), "access policy"))
    }

    /// Record attributes of a transition declared without source or targets.
    ///
    /// They are merged into complete transitions with the same name when the
    /// builder is finalized.
    pub fn add_transition_decoration(
        &mut self,
        name: &str,
        color: Option<&str>,
        access_policy: Option<&str>,
        origin: &DirectiveOrigin,
    ) -> Result<(), BuildError> {
        self.ensure_mutable()?;
        let subject = format!("transition '{}'", name);
        let decoration = self.decorations.entry(name.to_string()).or_default();
        decoration.origins.insert(origin.clone());

        let by = Provenance::Direct(origin.clone());
        let mut result = Ok(());
        if let Some(color) = color {
            result = claim(&mut decoration.color, color.to_string(), by.clone()).map_err(|c| (c, "color"));
        }
        if let (Ok(()), Some(policy)) = (&result, access_policy) {
            result = claim(&mut decoration.access_policy, policy.to_string(), by).map_err(|c| (c, "access policy"));
        }
        result.map_err(|(c, role)| self.conflict(c, subject, role))
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Declare a property; re-adding the same name is a no-op
    pub fn add_property(&mut self, name: &str) -> Result<(), BuildError> {
        self.property_record(name).map(|_| ())
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    fn property_record(&mut self, name: &str) -> Result<&mut PropertyRecord, BuildError> {
        self.ensure_mutable()?;
        Ok(self.properties.entry(name.to_string()).or_insert_with(|| {
            trace!(property = name, "Adding property");
            PropertyRecord {
                type_hint: None,
                nullable: None,
                roles: BTreeMap::new(),
                extensions: ExtensionRegistry::new(format!("property '{}'", name), Attachment::Property),
            }
        }))
    }

    /// Claim an exclusive role for a property.
    ///
    /// A second claim of the same role on the same property fails, naming
    /// both declarations.
    pub fn claim_property_role(
        &mut self,
        property: &str,
        role: PropertyRole,
        origin: &DirectiveOrigin,
    ) -> Result<(), BuildError> {
        let class = self.class.clone();
        let record = self.property_record(property)?;
        if let Some(first) = record.roles.get(&role) {
            let (first, second) = if first <= origin {
                (first.clone(), origin.clone())
            } else {
                (origin.clone(), first.clone())
            };
            return Err(BuildError::ConflictingAnnotation {
                class,
                subject: format!("property '{}'", property),
                role: role.to_string(),
                first: first.to_string(),
                second: second.to_string(),
            });
        }
        record.roles.insert(role, origin.clone());
        Ok(())
    }

    pub fn set_property_type(&mut self, property: &str, type_hint: &str, by: Provenance) -> Result<(), BuildError> {
        let record = self.property_record(property)?;
        let result = claim(&mut record.type_hint, type_hint.to_string(), by);
        result.map_err(|c| self.conflict(c, format!("property '{}'", property), "type"))
    }

    pub fn set_property_nullable(&mut self, property: &str, nullable: bool, by: Provenance) -> Result<(), BuildError> {
        let record = self.property_record(property)?;
        let result = claim(&mut record.nullable, nullable, by);
        result.map_err(|c| self.conflict(c, format!("property '{}'", property), "nullable"))
    }

    pub fn property_extension_placeholder<P: PlaceholderVariant>(&mut self, property: &str) -> Result<&mut P, BuildError> {
        self.property_record(property)?.extensions.get_or_create_typed::<P>()
    }

    /// Report a claim conflict on `subject`; used by preprocessors that
    /// claim placeholder fields directly
    pub fn conflict_error(&self, conflict: ClaimConflict, subject: impl Into<String>, role: &str) -> BuildError {
        self.conflict(conflict, subject, role)
    }

    // =========================================================================
    // Machine extensions
    // =========================================================================

    /// Get (or create) the machine-level placeholder for `kind`.
    ///
    /// Every call within one build returns the same placeholder.
    pub fn extension_placeholder(&mut self, kind: ExtensionKind) -> Result<&mut ExtensionPlaceholder, BuildError> {
        self.ensure_mutable()?;
        self.extensions.get_or_create(kind)
    }

    /// Typed form of [`extension_placeholder`](Self::extension_placeholder)
    pub fn machine_extension<P: PlaceholderVariant>(&mut self) -> Result<&mut P, BuildError> {
        self.ensure_mutable()?;
        self.extensions.get_or_create_typed::<P>()
    }

    pub fn machine_extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    // =========================================================================
    // Pass queue
    // =========================================================================

    /// Append a pass to the back of the queue
    pub fn add_preprocessor_pass(&mut self, pass: PreprocessorPass) -> Result<(), BuildError> {
        self.ensure_mutable()?;
        debug!(pass = %pass.kind(), origin = %pass.origin, "Enqueueing preprocessor pass");
        self.passes.push_back(pass);
        Ok(())
    }

    /// Take the pass at the front of the queue
    pub fn take_next_pass(&mut self) -> Option<PreprocessorPass> {
        if self.frozen {
            return None;
        }
        self.passes.pop_front()
    }

    pub fn pending_passes(&self) -> usize {
        self.passes.len()
    }

    /// Record that `file` (restricted to `group`) is being read as `format`.
    ///
    /// Returns `false` if the same file, group and format were included
    /// before in this session.
    pub fn mark_included(
        &mut self,
        file: PathBuf,
        group: Option<String>,
        format: DiagramFormat,
    ) -> Result<bool, BuildError> {
        self.ensure_mutable()?;
        Ok(self.included.insert((file, group, format)))
    }

    // =========================================================================
    // Finalization
    // =========================================================================

    /// Validate and freeze the builder into an immutable definition.
    ///
    /// The builder is frozen even when validation fails; every later
    /// mutation fails with [`BuildError::BuilderFrozen`].
    pub fn finalize(&mut self) -> Result<Definition, BuildError> {
        self.ensure_mutable()?;
        let finalize_span = span!(Level::INFO, "finalize_definition", class = %self.class);
        let _enter = finalize_span.enter();

        if let Some(pass) = self.passes.front() {
            warn!(pending = self.passes.len(), "Finalizing with unprocessed passes");
            let kind = pass.kind();
            self.frozen = true;
            return Err(BuildError::NoPreprocessor {
                class: self.class.clone(),
                pass: kind,
            });
        }

        let result = self.apply_decorations();
        self.frozen = true;
        result?;

        let declared: BTreeSet<StateName> = self.states.keys().cloned().collect();
        for key in self.transitions.keys() {
            validation::check_declared_states(&self.class, &declared, key)?;
        }

        let extensions = self.extensions.freeze_all()?;

        let mut states = BTreeMap::new();
        for (name, record) in &self.states {
            states.insert(
                name.clone(),
                StateDefinition {
                    name: name.clone(),
                    extensions: record.extensions.freeze_all()?,
                },
            );
        }

        let mut transitions = Vec::with_capacity(self.transitions.len());
        for (key, record) in &self.transitions {
            transitions.push(TransitionDefinition {
                source: key.source.clone(),
                targets: key.targets.clone(),
                name: record.name.as_ref().map(|c| c.value().clone()),
                extensions: record.extensions.freeze_all()?,
            });
        }

        let mut properties = BTreeMap::new();
        for (name, record) in &self.properties {
            properties.insert(
                name.clone(),
                PropertyDefinition {
                    name: name.clone(),
                    type_hint: record.type_hint.as_ref().map(|c| c.value().clone()),
                    nullable: record.nullable.as_ref().is_some_and(|c| *c.value()),
                    roles: record.roles.keys().copied().collect(),
                    extensions: record.extensions.freeze_all()?,
                },
            );
        }

        validation::check_contradictions(&self.class, &transitions)?;
        validation::check_access_policies(&self.class, &extensions, &transitions, &properties)?;

        info!(
            states = states.len(),
            transitions = transitions.len(),
            properties = properties.len(),
            extensions = extensions.len(),
            "Definition finalized"
        );

        Ok(Definition::new(
            self.class.clone(),
            self.machine_type.clone(),
            states,
            transitions,
            properties,
            extensions,
        ))
    }

    /// Merge incomplete transition declarations into complete transitions
    /// carrying the same name
    fn apply_decorations(&mut self) -> Result<(), BuildError> {
        let decorations = std::mem::take(&mut self.decorations);
        for (name, decoration) in decorations {
            let keys: Vec<TransitionKey> = self
                .transitions
                .iter()
                .filter(|(_, record)| record.name.as_ref().is_some_and(|c| c.value() == &name))
                .map(|(key, _)| key.clone())
                .collect();

            if keys.is_empty() {
                if self.drop_incomplete_transitions {
                    debug!(transition = %name, "Dropping incomplete transition");
                    continue;
                }
                return Err(BuildError::IncompleteTransition {
                    class: self.class.clone(),
                    name,
                });
            }

            let origins: Vec<String> = decoration.origins.iter().map(|o| o.to_string()).collect();
            let by = Provenance::derived(format!("base declaration {}", origins.join(", ")));
            for key in &keys {
                if let Some(color) = &decoration.color {
                    self.set_transition_color(key, color.value(), by.clone())?;
                }
                if let Some(policy) = &decoration.access_policy {
                    self.set_transition_policy(key, policy.value(), by.clone())?;
                }
            }
        }
        Ok(())
    }
}
