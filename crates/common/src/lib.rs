//! Shared identifier types used across the marketplace workspace.

pub mod types;

pub use types::{OrderId, ProductId, StoreId, UserId, VoucherId};
