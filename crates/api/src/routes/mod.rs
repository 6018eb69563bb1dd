pub mod control;
pub mod dashboard;
pub mod incidents;
pub mod overview;
pub mod workers;
