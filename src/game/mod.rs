pub mod models;
pub mod odds;
pub mod phase;
