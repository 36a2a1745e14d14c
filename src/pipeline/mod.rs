pub mod builder;
pub mod extract;
pub mod rankings;
