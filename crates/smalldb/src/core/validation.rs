//! Checks run while a builder is frozen into a definition

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::builder::TransitionKey;
use super::definition::{PropertyDefinition, TransitionDefinition};
use super::error::BuildError;
use super::extension::{extension_in, AccessControlExtension, ExtensionMap};
use super::types::StateName;

/// Every state a transition touches must be declared (or be the
/// not-exists pseudo-state)
pub fn check_declared_states(
    class: &str,
    declared: &BTreeSet<StateName>,
    key: &TransitionKey,
) -> Result<(), BuildError> {
    match key.states().find(|s| !s.is_not_exists() && !declared.contains(*s)) {
        Some(state) => Err(BuildError::UndeclaredState {
            class: class.to_string(),
            state: state.to_string(),
            transition: key.to_string(),
        }),
        None => Ok(()),
    }
}

/// Transitions that share a source and a name but lead to different
/// target sets must agree on their color and access policy
pub fn check_contradictions(class: &str, transitions: &[TransitionDefinition]) -> Result<(), BuildError> {
    let mut by_name: BTreeMap<(&StateName, &str), Vec<&TransitionDefinition>> = BTreeMap::new();
    for transition in transitions {
        if let Some(name) = &transition.name {
            by_name
                .entry((&transition.source, name.as_str()))
                .or_default()
                .push(transition);
        }
    }

    for ((source, name), group) in by_name.into_iter().filter(|(_, g)| g.len() > 1) {
        debug!(source = %source, name, count = group.len(), "Checking same-name transitions");
        let attributes: [(&'static str, fn(&TransitionDefinition) -> Option<&str>); 2] = [
            ("color", TransitionDefinition::color),
            ("access policy", TransitionDefinition::access_policy),
        ];
        for (role, read) in attributes {
            let mut values = group.iter().filter_map(|t| read(t));
            if let Some(first) = values.next() {
                if let Some(second) = values.find(|v| *v != first) {
                    return Err(BuildError::ContradictoryTransitions {
                        class: class.to_string(),
                        source_state: source.to_string(),
                        name: name.to_string(),
                        role,
                        first: first.to_string(),
                        second: second.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Policy names used by transitions (and the default policy) must be
/// defined, and owner rules must point at declared properties
pub fn check_access_policies(
    class: &str,
    extensions: &ExtensionMap,
    transitions: &[TransitionDefinition],
    properties: &BTreeMap<String, PropertyDefinition>,
) -> Result<(), BuildError> {
    let access = extension_in::<AccessControlExtension>(extensions);
    let defined = |policy: &str| access.is_some_and(|a| a.policies.contains_key(policy));

    for transition in transitions {
        if let Some(policy) = transition.access_policy() {
            if !defined(policy) {
                return Err(BuildError::UnknownAccessPolicy {
                    class: class.to_string(),
                    policy: policy.to_string(),
                    user: format!("transition {}", transition),
                });
            }
        }
    }

    let Some(access) = access else {
        return Ok(());
    };

    if let Some(policy) = &access.default_policy {
        if !defined(policy) {
            return Err(BuildError::UnknownAccessPolicy {
                class: class.to_string(),
                policy: policy.clone(),
                user: "default policy".to_string(),
            });
        }
    }

    for (name, rule) in &access.policies {
        if let Some(property) = rule
            .referenced_properties()
            .into_iter()
            .find(|p| !properties.contains_key(*p))
        {
            return Err(BuildError::UnknownProperty {
                class: class.to_string(),
                property: property.to_string(),
                user: format!("access policy '{}'", name),
            });
        }
    }
    Ok(())
}
