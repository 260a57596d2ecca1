//! Domain types for the marketplace order engine.
//!
//! This crate carries the pure, storage-agnostic vocabulary of the system:
//! - `Money` in minor currency units
//! - `OrderStatus` state machine with transition guards
//! - checkout value objects (item requests, delivery details, method selectors)
//! - `Actor` attribution for audit trails

pub mod actor;
pub mod money;
pub mod request;
pub mod status;

pub use actor::Actor;
pub use money::Money;
pub use request::{
    Coordinates, DeliveryDetails, ItemRequest, PaymentMethod, ShippingMethod,
};
pub use status::OrderStatus;
