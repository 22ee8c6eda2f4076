//! Preprocessor plugins and the build pipeline
//!
//! Each plugin consumes one kind of preprocessor pass. The pipeline selects
//! the single plugin supporting each queued pass and runs it.

pub mod diagram;
pub mod doctrine;
pub mod dto;
pub mod pipeline;

pub use diagram::*;
pub use doctrine::*;
pub use dto::*;
pub use pipeline::*;
