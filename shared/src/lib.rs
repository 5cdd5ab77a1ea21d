//! Shared domain core for the estate weighbridge platform
//!
//! The premi engine and the scale ticket lifecycle live here so the backend
//! and the WASM previews run the same rules.

pub mod batch;
pub mod error;
pub mod models;
pub mod premi;
pub mod types;
pub mod validation;
pub mod weighbridge;

pub use batch::*;
pub use error::*;
pub use models::*;
pub use premi::*;
pub use types::*;
pub use validation::*;
pub use weighbridge::*;
