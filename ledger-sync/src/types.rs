//! Customer and order aggregates as handed over by the host application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub business_name: String,
    #[serde(default)]
    pub contact_person: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    pub delivery_address: PostalAddress,
    /// Falls back to the delivery address when absent
    #[serde(default)]
    pub billing_address: Option<PostalAddress>,
    /// Free text such as "Net 30"
    #[serde(default)]
    pub payment_terms: Option<String>,
    /// Set once contact sync has succeeded
    #[serde(default)]
    pub external_contact_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub sku: String,
    pub description: String,
    pub quantity: u32,
    /// Minor currency units (cents)
    pub unit_price_cents: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Delivered orders are billed. Cancelled ones may already carry an
    /// invoice awaiting credit, so they are accepted too.
    pub fn is_invoiceable(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

/// External document references stored on an order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderExternalLink {
    pub invoice_id: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_status: Option<String>,
    pub credit_note_id: Option<String>,
    pub credit_note_number: Option<String>,
}

impl OrderExternalLink {
    /// Fill gaps from a previously persisted link without overwriting.
    pub fn merge_missing(&mut self, stored: &OrderExternalLink) {
        fn fill(target: &mut Option<String>, source: &Option<String>) {
            if target.is_none() {
                target.clone_from(source);
            }
        }
        fill(&mut self.invoice_id, &stored.invoice_id);
        fill(&mut self.invoice_number, &stored.invoice_number);
        fill(&mut self.invoice_status, &stored.invoice_status);
        fill(&mut self.credit_note_id, &stored.credit_note_id);
        fill(&mut self.credit_note_number, &stored.credit_note_number);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub customer_id: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    /// Order total in minor units, as charged to the customer
    pub total_cents: i64,
    /// When delivery completed; drives the invoice date
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub link: OrderExternalLink,
}
