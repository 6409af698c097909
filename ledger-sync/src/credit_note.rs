//! Credit note for an invoiced order, with best-effort allocation.

use crate::invoice::{build_line_items, require_contact, SyncSettings};
use crate::mapping::minor_to_major;
use crate::payloads::{
    envelope, first_record, AllocationPayload, ContactRef, CreditNotePayload,
    CreditNotesEnvelope, InvoiceRef, CREDIT_NOTE_TYPE_RECEIVABLE, LINE_AMOUNTS_EXCLUSIVE,
    STATUS_AUTHORISED,
};
use crate::types::{Customer, Order, OrderStatus};
use chrono::{NaiveDate, Utc};
use ledgerlink::{AccountingClient, SyncError, SyncResult};
use reqwest::Method;
use tracing::{error, info, warn};

pub const CREDIT_DESCRIPTION_PREFIX: &str = "Credit: ";

/// Outcome of applying the credit note against its invoice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Allocation {
    Applied,
    /// The credit note exists but is unallocated.
    Failed(String),
}

impl Allocation {
    pub fn error(&self) -> Option<&str> {
        match self {
            Allocation::Applied => None,
            Allocation::Failed(message) => Some(message),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreditNoteSync {
    pub credit_note_id: String,
    pub credit_note_number: Option<String>,
    pub allocation: Allocation,
}

pub fn build_credit_note(
    contact_id: &str,
    order: &Order,
    settings: &SyncSettings,
    today: NaiveDate,
) -> CreditNotePayload {
    CreditNotePayload {
        credit_note_type: CREDIT_NOTE_TYPE_RECEIVABLE.to_string(),
        contact: ContactRef {
            contact_id: contact_id.to_string(),
        },
        date: today,
        reference: order.order_number.clone(),
        status: STATUS_AUTHORISED.to_string(),
        line_amount_types: LINE_AMOUNTS_EXCLUSIVE.to_string(),
        line_items: build_line_items(order, settings, CREDIT_DESCRIPTION_PREFIX),
    }
}

/// Create an authorised credit note for a cancelled, invoiced order, then
/// try to allocate it against the invoice for the full order total.
///
/// Fails before any network call when the customer is not synced, the order
/// is not cancelled, has no invoice, or already has a credit note.
///
/// Only the creation call can fail the operation. An allocation error is
/// logged and reported through [`Allocation::Failed`].
pub async fn create_credit_note(
    client: &AccountingClient,
    settings: &SyncSettings,
    customer: &Customer,
    order: &Order,
) -> SyncResult<CreditNoteSync> {
    let contact_id = require_contact(customer)?;
    if order.status != OrderStatus::Cancelled {
        return Err(SyncError::InvalidOrderStatus {
            order_id: order.id.clone(),
            status: order.status.as_str().to_string(),
            document: "credit note".to_string(),
        });
    }
    let invoice_id = order
        .link
        .invoice_id
        .as_deref()
        .ok_or_else(|| SyncError::NoInvoiceToCredit {
            order_id: order.id.clone(),
        })?;
    if let Some(credit_note_id) = &order.link.credit_note_id {
        return Err(SyncError::DuplicateCreditNote {
            order_id: order.id.clone(),
            credit_note_id: credit_note_id.clone(),
        });
    }

    let today = Utc::now().date_naive();
    let payload = build_credit_note(contact_id, order, settings, today);
    let body = envelope("CreditNotes", std::slice::from_ref(&payload))?;

    let response: CreditNotesEnvelope = client
        .request_json(Method::POST, "CreditNotes", Some(&body))
        .await
        .map_err(|e| {
            error!(order_id = %order.id, error = %e, "Credit note creation failed");
            e
        })?;
    let record = first_record(response.credit_notes, "CreditNotes")?;

    info!(
        order_id = %order.id,
        credit_note_id = %record.credit_note_id,
        "Credit note created"
    );

    let allocation = match allocate(client, &record.credit_note_id, invoice_id, order, today).await {
        Ok(()) => Allocation::Applied,
        Err(e) => {
            warn!(
                order_id = %order.id,
                credit_note_id = %record.credit_note_id,
                invoice_id = %invoice_id,
                error = %e,
                "Credit note allocation failed, leaving it unallocated"
            );
            Allocation::Failed(e.to_string())
        }
    };

    Ok(CreditNoteSync {
        credit_note_id: record.credit_note_id,
        credit_note_number: record.credit_note_number,
        allocation,
    })
}

async fn allocate(
    client: &AccountingClient,
    credit_note_id: &str,
    invoice_id: &str,
    order: &Order,
    date: NaiveDate,
) -> SyncResult<()> {
    let allocation = AllocationPayload {
        amount: minor_to_major(order.total_cents),
        invoice: InvoiceRef {
            invoice_id: invoice_id.to_string(),
        },
        date,
    };
    let body = envelope("Allocations", std::slice::from_ref(&allocation))?;
    client
        .request(
            Method::PUT,
            &format!("CreditNotes/{}/Allocations", credit_note_id),
            Some(&body),
        )
        .await?;
    Ok(())
}
