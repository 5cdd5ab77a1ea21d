//! Domain models for estate harvest and weighbridge operations

mod block;
mod harvest;
mod premi;
mod quality;
mod scale;
mod stock;
mod upkeep;

pub use block::*;
pub use harvest::*;
pub use premi::*;
pub use quality::*;
pub use scale::*;
pub use stock::*;
pub use upkeep::*;
