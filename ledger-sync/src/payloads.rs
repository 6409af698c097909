//! JSON bodies exchanged with the accounting API (PascalCase on the wire).

use chrono::NaiveDate;
use ledgerlink::{SyncError, SyncResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const PHONE_DEFAULT: &str = "DEFAULT";
pub const PHONE_MOBILE: &str = "MOBILE";
pub const ADDRESS_STREET: &str = "STREET";
pub const ADDRESS_POBOX: &str = "POBOX";
pub const TERMS_DAYS_AFTER_BILL_DATE: &str = "DAYSAFTERBILLDATE";

pub const INVOICE_TYPE_RECEIVABLE: &str = "ACCREC";
pub const CREDIT_NOTE_TYPE_RECEIVABLE: &str = "ACCRECCREDIT";
pub const STATUS_AUTHORISED: &str = "AUTHORISED";
pub const LINE_AMOUNTS_EXCLUSIVE: &str = "Exclusive";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContactPayload {
    #[serde(rename = "ContactID", skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
    pub phones: Vec<Phone>,
    pub addresses: Vec<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_terms: Option<PaymentTerms>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Phone {
    pub phone_type: String,
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Address {
    pub address_type: String,
    pub address_line1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PaymentTerms {
    pub bills: PaymentTerm,
    pub sales: PaymentTerm,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PaymentTerm {
    pub day: u32,
    #[serde(rename = "Type")]
    pub term_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactRef {
    #[serde(rename = "ContactID")]
    pub contact_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct LineItem {
    pub description: String,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_amount: Decimal,
    pub account_code: String,
    pub tax_type: String,
    pub item_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvoicePayload {
    #[serde(rename = "Type")]
    pub invoice_type: String,
    pub contact: ContactRef,
    pub date: NaiveDate,
    pub due_date: NaiveDate,
    pub reference: String,
    pub status: String,
    pub line_amount_types: String,
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreditNotePayload {
    #[serde(rename = "Type")]
    pub credit_note_type: String,
    pub contact: ContactRef,
    pub date: NaiveDate,
    pub reference: String,
    pub status: String,
    pub line_amount_types: String,
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceRef {
    #[serde(rename = "InvoiceID")]
    pub invoice_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AllocationPayload {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub invoice: InvoiceRef,
    pub date: NaiveDate,
}

/// Wraps records in the `{ "<Resource>": [ ... ] }` envelope the API expects.
pub fn envelope<T: Serialize>(resource: &str, records: &[T]) -> SyncResult<serde_json::Value> {
    let records = serde_json::to_value(records)
        .map_err(|e| SyncError::InvalidResponse(format!("cannot encode {}: {}", resource, e)))?;
    let mut body = serde_json::Map::new();
    body.insert(resource.to_string(), records);
    Ok(serde_json::Value::Object(body))
}

#[derive(Debug, Deserialize)]
pub struct ContactRecord {
    #[serde(rename = "ContactID")]
    pub contact_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ContactsEnvelope {
    #[serde(rename = "Contacts", default)]
    pub contacts: Vec<ContactRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvoiceRecord {
    #[serde(rename = "InvoiceID")]
    pub invoice_id: String,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InvoicesEnvelope {
    #[serde(rename = "Invoices", default)]
    pub invoices: Vec<InvoiceRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreditNoteRecord {
    #[serde(rename = "CreditNoteID")]
    pub credit_note_id: String,
    #[serde(default)]
    pub credit_note_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreditNotesEnvelope {
    #[serde(rename = "CreditNotes", default)]
    pub credit_notes: Vec<CreditNoteRecord>,
}

/// First record of a response envelope, or `InvalidResponse` when empty.
pub fn first_record<T>(records: Vec<T>, resource: &str) -> SyncResult<T> {
    records
        .into_iter()
        .next()
        .ok_or_else(|| SyncError::InvalidResponse(format!("{} response was empty", resource)))
}
