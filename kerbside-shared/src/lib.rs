pub mod events;
pub mod models;

pub use events::OccupancyUpdate;
pub use models::*;
