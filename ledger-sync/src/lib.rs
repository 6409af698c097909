//! Customer, invoice and credit note sync against the accounting service.
//!
//! All external calls go through [`ledgerlink::AccountingClient`], so token
//! refresh is invisible here. Callers sync a customer before invoicing its
//! orders and invoice an order before crediting it; the protocols enforce
//! that order, and the order status each document needs, only through their
//! precondition errors.

// Domain aggregates
pub mod types;

// Payment terms and money conversion
pub mod mapping;

// Accounting API wire format
pub mod payloads;

pub mod contact;
pub mod invoice;
pub mod credit_note;

// SQLite link storage
pub mod links;

pub mod service;

pub use contact::{build_contact, sync_contact, ContactSync};
pub use credit_note::{create_credit_note, Allocation, CreditNoteSync};
pub use invoice::{create_invoice, InvoiceSync, SyncSettings};
pub use links::{CustomerLinkRecord, LinkStore, OrderLinkRecord};
pub use service::SyncService;
pub use types::{Customer, Order, OrderExternalLink, OrderItem, OrderStatus, PostalAddress};
