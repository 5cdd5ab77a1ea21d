//! Premi (bonus) engines for harvest, upkeep and supervisors

mod calculator;
mod supervisor;
mod upkeep;

pub use calculator::*;
pub use supervisor::*;
pub use upkeep::*;
