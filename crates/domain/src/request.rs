//! Checkout value objects: item requests, delivery details, method selectors.

use common::{ProductId, StoreId};
use serde::{Deserialize, Serialize};

/// A requested order line: which product and how many.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRequest {
    /// The product to order.
    pub product_id: ProductId,
    /// Quantity requested.
    pub quantity: u32,
}

impl ItemRequest {
    /// Creates a new item request.
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Geographic coordinates of a delivery point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Delivery target information supplied at checkout.
///
/// Store resolution prefers explicit coordinates, then the free-form address.
/// When both are absent the resolver falls back to the caller's saved
/// primary address (a concern of the resolver implementation).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryDetails {
    /// Explicit delivery coordinates, if the client sent them.
    pub coordinates: Option<Coordinates>,
    /// Free-form delivery address.
    pub address: Option<String>,
    /// Explicit target store, bypassing resolution.
    pub store_id: Option<StoreId>,
}

/// How the customer intends to pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Manual bank transfer; proof is uploaded and reviewed.
    BankTransfer,
    /// E-wallet payment confirmed by a gateway webhook.
    EWallet,
    /// Cash handed to the courier on delivery.
    CashOnDelivery,
}

impl PaymentMethod {
    /// Returns the method name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::EWallet => "e_wallet",
            PaymentMethod::CashOnDelivery => "cash_on_delivery",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "e_wallet" => Ok(PaymentMethod::EWallet),
            "cash_on_delivery" => Ok(PaymentMethod::CashOnDelivery),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}

/// How the order reaches the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    /// Customer picks the order up at the store; no fee.
    Pickup,
    /// Store courier delivers; flat fee from checkout configuration.
    Courier,
}
