pub mod monitor;
pub mod positions;
