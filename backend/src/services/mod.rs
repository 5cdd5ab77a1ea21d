//! Business logic services for the estate weighbridge platform

pub mod auth;
pub mod farm_data;
pub mod harvest;
pub mod master_data;
pub mod premi;
pub mod quality_control;
pub mod scale_store;
pub mod scale_ticket;
pub mod unit_of_work;
pub mod upkeep;

pub use auth::AuthService;
pub use farm_data::FarmDataService;
pub use harvest::HarvestService;
pub use master_data::MasterDataService;
pub use premi::PremiService;
pub use quality_control::QualityControlService;
pub use scale_ticket::ScaleTicketService;
pub use upkeep::UpkeepService;
