//! Sync entry points used by the host's customer and order workflows.

use crate::contact::{sync_contact, ContactSync};
use crate::credit_note::{create_credit_note, CreditNoteSync};
use crate::invoice::{create_invoice, InvoiceSync, SyncSettings};
use crate::links::LinkStore;
use crate::types::{Customer, Order};
use ledgerlink::{AccountingClient, SyncError, SyncResult};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{error, warn};

/// Runs the sync protocols and keeps the link store in step with them.
///
/// Successful calls write the external ids onto the aggregate and persist
/// them. Failed calls record the error text as the entity's
/// `last_sync_error` and hand back the typed error.
pub struct SyncService {
    client: Arc<AccountingClient>,
    links: Arc<LinkStore>,
    settings: SyncSettings,
}

impl SyncService {
    pub fn new(client: Arc<AccountingClient>, links: Arc<LinkStore>, settings: SyncSettings) -> Self {
        Self {
            client,
            links,
            settings,
        }
    }

    pub fn links(&self) -> &Arc<LinkStore> {
        &self.links
    }

    /// Create or update the customer's contact.
    pub async fn sync_customer(&self, customer: &mut Customer) -> SyncResult<ContactSync> {
        if customer.external_contact_id.is_none() {
            customer.external_contact_id = self.stored_contact_id(&customer.id)?;
        }

        match sync_contact(&self.client, customer).await {
            Ok(result) => {
                customer.external_contact_id = Some(result.contact_id.clone());
                self.links
                    .record_contact(&customer.id, &result.contact_id)
                    .map_err(SyncError::storage)?;
                Ok(result)
            }
            Err(e) => {
                self.record_customer_failure(&customer.id, &e);
                Err(e)
            }
        }
    }

    /// Invoice the order once. A second call for the same order fails with
    /// `DuplicateInvoice` without touching the network.
    pub async fn sync_order_invoice(
        &self,
        customer: &Customer,
        order: &mut Order,
    ) -> SyncResult<InvoiceSync> {
        let customer = self.with_stored_contact(customer)?;
        self.merge_stored_order_link(order)?;

        match create_invoice(&self.client, &self.settings, &customer, order).await {
            Ok(result) => {
                order.link.invoice_id = Some(result.invoice_id.clone());
                order.link.invoice_number = result.invoice_number.clone();
                order.link.invoice_status = result.invoice_status.clone();
                self.links
                    .record_invoice(
                        &order.id,
                        &result.invoice_id,
                        result.invoice_number.as_deref(),
                        result.invoice_status.as_deref(),
                    )
                    .map_err(|e| {
                        error!(order_id = %order.id, invoice_id = %result.invoice_id, error = %e, "Invoice created but link not saved");
                        SyncError::storage(e)
                    })?;
                Ok(result)
            }
            Err(e) => {
                self.record_order_failure(&order.id, &e);
                Err(e)
            }
        }
    }

    /// Credit a cancelled, invoiced order once. An unallocated credit note
    /// still counts as success; its allocation error is stored alongside the
    /// link. A second call fails with `DuplicateCreditNote`.
    pub async fn sync_order_credit_note(
        &self,
        customer: &Customer,
        order: &mut Order,
    ) -> SyncResult<CreditNoteSync> {
        let customer = self.with_stored_contact(customer)?;
        self.merge_stored_order_link(order)?;

        match create_credit_note(&self.client, &self.settings, &customer, order).await {
            Ok(result) => {
                order.link.credit_note_id = Some(result.credit_note_id.clone());
                order.link.credit_note_number = result.credit_note_number.clone();
                self.links
                    .record_credit_note(
                        &order.id,
                        &result.credit_note_id,
                        result.credit_note_number.as_deref(),
                        result.allocation.error(),
                    )
                    .map_err(|e| {
                        error!(order_id = %order.id, credit_note_id = %result.credit_note_id, error = %e, "Credit note created but link not saved");
                        SyncError::storage(e)
                    })?;
                Ok(result)
            }
            Err(e) => {
                self.record_order_failure(&order.id, &e);
                Err(e)
            }
        }
    }

    fn stored_contact_id(&self, customer_id: &str) -> SyncResult<Option<String>> {
        Ok(self
            .links
            .customer_link(customer_id)
            .map_err(SyncError::storage)?
            .and_then(|record| record.external_contact_id))
    }

    fn with_stored_contact<'a>(&self, customer: &'a Customer) -> SyncResult<Cow<'a, Customer>> {
        if customer.external_contact_id.is_some() {
            return Ok(Cow::Borrowed(customer));
        }
        match self.stored_contact_id(&customer.id)? {
            Some(contact_id) => {
                let mut resolved = customer.clone();
                resolved.external_contact_id = Some(contact_id);
                Ok(Cow::Owned(resolved))
            }
            None => Ok(Cow::Borrowed(customer)),
        }
    }

    fn merge_stored_order_link(&self, order: &mut Order) -> SyncResult<()> {
        if let Some(record) = self.links.order_link(&order.id).map_err(SyncError::storage)? {
            order.link.merge_missing(&record.link);
        }
        Ok(())
    }

    fn record_customer_failure(&self, customer_id: &str, err: &SyncError) {
        if let Err(e) = self.links.record_customer_error(customer_id, &err.to_string()) {
            warn!(customer_id = %customer_id, error = %e, "Failed to record customer sync error");
        }
    }

    fn record_order_failure(&self, order_id: &str, err: &SyncError) {
        if let Err(e) = self.links.record_order_error(order_id, &err.to_string()) {
            warn!(order_id = %order_id, error = %e, "Failed to record order sync error");
        }
    }
}
