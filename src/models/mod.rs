//! Domain models shared across the position service.

pub mod balance;
pub mod position;
pub mod quote;
pub mod request;

pub use balance::Balance;
pub use position::{CloseReason, Direction, Position};
pub use quote::Quote;
pub use request::{ListPositionsQuery, OpenOrder, OpenPositionRequest};
