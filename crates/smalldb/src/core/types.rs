//! Core type definitions for definition building
//!
//! State names, directive origins, and the claim bookkeeping that decides
//! which declaration wins when several sources set the same attribute.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the pseudo-state used for entities that do not exist yet
/// (or no longer exist).
pub const NOT_EXISTS: &str = "";

/// A state identifier, unique within one machine definition
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateName(String);

impl StateName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The distinguished pseudo-state with no entity backing
    pub fn not_exists() -> Self {
        Self(NOT_EXISTS.to_string())
    }

    pub fn is_not_exists(&self) -> bool {
        self.0 == NOT_EXISTS
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_not_exists() {
            write!(f, "[not exists]")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<&str> for StateName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StateName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Where a directive was declared
///
/// Carried into every error message so a conflict can be traced back to
/// the declarations that caused it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct DirectiveOrigin {
    /// Declaring class
    #[serde(default)]
    pub class: String,
    /// Class member (method, property, constant) the directive is attached to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<String>,
    /// Directive (annotation) name
    #[serde(default)]
    pub directive: String,
}

impl DirectiveOrigin {
    pub fn new(class: impl Into<String>, directive: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            member: None,
            directive: directive.into(),
        }
    }

    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }
}

impl fmt::Display for DirectiveOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.member {
            Some(member) => write!(f, "{}::{} @{}", self.class, member, self.directive),
            None => write!(f, "{} @{}", self.class, self.directive),
        }
    }
}

/// Who contributed a value to the builder
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Provenance {
    /// Declared directly on the class
    Direct(DirectiveOrigin),
    /// Discovered through an included diagram or computed by a preprocessor
    Derived(String),
}

impl Provenance {
    pub fn derived(source: impl Into<String>) -> Self {
        Self::Derived(source.into())
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, Provenance::Direct(_))
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Direct(origin) => write!(f, "{}", origin),
            Provenance::Derived(source) => write!(f, "{}", source),
        }
    }
}

impl From<DirectiveOrigin> for Provenance {
    fn from(origin: DirectiveOrigin) -> Self {
        Self::Direct(origin)
    }
}

/// A single-valued attribute together with whoever set it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim<T> {
    value: T,
    provenance: Provenance,
}

impl<T> Claim<T> {
    pub fn new(value: T, provenance: Provenance) -> Self {
        Self { value, provenance }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

/// Two sources disagree on one attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimConflict {
    pub existing: String,
    pub existing_by: Provenance,
    pub incoming: String,
    pub incoming_by: Provenance,
}

impl ClaimConflict {
    /// Turn the conflict into a build error for `subject` (e.g. "property 'id'").
    ///
    /// Both sides are listed in provenance order, so the message is the same
    /// whichever side was claimed first.
    pub fn into_error(
        self,
        class: &str,
        subject: impl Into<String>,
        role: impl Into<String>,
    ) -> super::error::BuildError {
        let existing = (self.existing_by, self.existing);
        let incoming = (self.incoming_by, self.incoming);
        let (first, second) = if existing <= incoming {
            (existing, incoming)
        } else {
            (incoming, existing)
        };
        super::error::BuildError::ConflictingAnnotation {
            class: class.to_string(),
            subject: subject.into(),
            role: format!("{} ({:?} vs {:?})", role.into(), first.1, second.1),
            first: first.0.to_string(),
            second: second.0.to_string(),
        }
    }
}

/// Record `value` in `slot`.
///
/// Equal values always merge. A direct declaration beats a derived one.
/// Two direct or two derived declarations with different values conflict.
/// The outcome does not depend on the order of calls.
pub fn claim<T>(slot: &mut Option<Claim<T>>, value: T, by: Provenance) -> Result<(), ClaimConflict>
where
    T: PartialEq + fmt::Debug,
{
    let Some(existing) = slot.as_mut() else {
        *slot = Some(Claim::new(value, by));
        return Ok(());
    };

    if existing.value == value {
        if by.is_direct() && !existing.provenance.is_direct() {
            existing.provenance = by;
        }
        return Ok(());
    }

    match (existing.provenance.is_direct(), by.is_direct()) {
        (true, false) => Ok(()),
        (false, true) => {
            *existing = Claim::new(value, by);
            Ok(())
        }
        _ => Err(ClaimConflict {
            existing: format!("{:?}", existing.value),
            existing_by: existing.provenance.clone(),
            incoming: format!("{:?}", value),
            incoming_by: by,
        }),
    }
}

/// Roles a property can be claimed for exclusively
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyRole {
    /// The property is (part of) the unique identifier of the entity
    Identifier,
}

impl fmt::Display for PropertyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyRole::Identifier => write!(f, "identifier"),
        }
    }
}
