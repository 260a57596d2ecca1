//! Relational persistence for the marketplace order engine.
//!
//! The `Storage` trait models the persistent relational collaborator: it
//! hands out multi-statement ACID transactions (`StorageTx`) whose
//! `*_for_update` reads carry row-lock semantics, so read-modify-write on
//! inventory and order rows is serialized against concurrent writers.
//!
//! Two backends are provided:
//! - [`InMemoryStorage`]: dev/test double; transactions hold a global lock,
//!   which makes them strictly serializable
//! - [`PostgresStorage`]: sqlx-backed, using `SELECT ... FOR UPDATE`

pub mod entities;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use entities::{
    JournalReason, OrderItemRecord, OrderRecord, ProductRecord, StockJournalRecord,
    StoreInventoryRecord, VoucherRecord,
};
pub use error::{Result, StorageError};
pub use memory::InMemoryStorage;
pub use postgres::PostgresStorage;
pub use store::{Storage, StorageTx};
