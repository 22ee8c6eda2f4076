//! Core abstractions for building state machine definitions
//!
//! Directives feed a [`DefinitionBuilder`]; preprocessors consume the passes
//! they request; [`DefinitionBuilder::finalize`] validates the result and
//! freezes it into a [`Definition`].

mod builder;
mod config;
mod definition;
mod diagram;
mod directive;
mod error;
pub mod export;
mod extension;
mod loader;
pub mod logging;
pub mod naming;
mod pass;
mod reconcile;
mod source;
mod types;
mod validation;

pub use builder::*;
pub use config::*;
pub use definition::*;
pub use diagram::*;
pub use directive::*;
pub use error::*;
pub use extension::*;
pub use loader::*;
pub use logging::*;
pub use pass::*;
pub use reconcile::*;
pub use source::*;
pub use types::*;
