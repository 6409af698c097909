//! Order → sales invoice, created at most once per order.

use crate::mapping::{due_date, minor_to_major};
use crate::payloads::{
    envelope, first_record, ContactRef, InvoicePayload, InvoicesEnvelope, LineItem,
    INVOICE_TYPE_RECEIVABLE, LINE_AMOUNTS_EXCLUSIVE, STATUS_AUTHORISED,
};
use crate::types::{Customer, Order};
use chrono::{NaiveDate, Utc};
use ledgerlink::config::XeroConfig;
use ledgerlink::{AccountingClient, SyncError, SyncResult};
use reqwest::Method;
use tracing::{error, info};

/// Ledger coding applied to every generated line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncSettings {
    pub sales_account_code: String,
    pub tax_type: String,
}

impl From<&XeroConfig> for SyncSettings {
    fn from(config: &XeroConfig) -> Self {
        Self {
            sales_account_code: config.sales_account_code.clone(),
            tax_type: config.tax_type.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvoiceSync {
    pub invoice_id: String,
    pub invoice_number: Option<String>,
    pub invoice_status: Option<String>,
}

/// Contact id of a synced customer, or `CustomerNotSynced`.
pub(crate) fn require_contact(customer: &Customer) -> SyncResult<&str> {
    customer
        .external_contact_id
        .as_deref()
        .ok_or_else(|| SyncError::CustomerNotSynced {
            customer_id: customer.id.clone(),
        })
}

/// One line per order item. `prefix` is prepended to each description.
pub(crate) fn build_line_items(order: &Order, settings: &SyncSettings, prefix: &str) -> Vec<LineItem> {
    order
        .items
        .iter()
        .map(|item| LineItem {
            description: format!("{}{}", prefix, item.description),
            quantity: item.quantity,
            unit_amount: minor_to_major(item.unit_price_cents),
            account_code: settings.sales_account_code.clone(),
            tax_type: settings.tax_type.clone(),
            item_code: item.sku.clone(),
        })
        .collect()
}

/// Invoice date: delivery completion when known, otherwise `today`.
pub fn invoice_date(order: &Order, today: NaiveDate) -> NaiveDate {
    order
        .delivered_at
        .map(|at| at.date_naive())
        .unwrap_or(today)
}

pub fn build_invoice(
    contact_id: &str,
    customer: &Customer,
    order: &Order,
    settings: &SyncSettings,
    today: NaiveDate,
) -> InvoicePayload {
    let date = invoice_date(order, today);
    InvoicePayload {
        invoice_type: INVOICE_TYPE_RECEIVABLE.to_string(),
        contact: ContactRef {
            contact_id: contact_id.to_string(),
        },
        date,
        due_date: due_date(date, customer.payment_terms.as_deref()),
        reference: order.order_number.clone(),
        status: STATUS_AUTHORISED.to_string(),
        line_amount_types: LINE_AMOUNTS_EXCLUSIVE.to_string(),
        line_items: build_line_items(order, settings, ""),
    }
}

/// Create the authorised sales invoice for an order.
///
/// Fails with `CustomerNotSynced`, `InvalidOrderStatus` or `DuplicateInvoice`
/// before any network call. The caller persists the returned id onto the order.
pub async fn create_invoice(
    client: &AccountingClient,
    settings: &SyncSettings,
    customer: &Customer,
    order: &Order,
) -> SyncResult<InvoiceSync> {
    let contact_id = require_contact(customer)?;
    if !order.status.is_invoiceable() {
        return Err(SyncError::InvalidOrderStatus {
            order_id: order.id.clone(),
            status: order.status.as_str().to_string(),
            document: "invoice".to_string(),
        });
    }
    if let Some(invoice_id) = &order.link.invoice_id {
        return Err(SyncError::DuplicateInvoice {
            order_id: order.id.clone(),
            invoice_id: invoice_id.clone(),
        });
    }

    let payload = build_invoice(contact_id, customer, order, settings, Utc::now().date_naive());
    let body = envelope("Invoices", std::slice::from_ref(&payload))?;

    let response: InvoicesEnvelope = client
        .request_json(Method::POST, "Invoices", Some(&body))
        .await
        .map_err(|e| {
            error!(order_id = %order.id, error = %e, "Invoice creation failed");
            e
        })?;
    let record = first_record(response.invoices, "Invoices")?;

    info!(
        order_id = %order.id,
        invoice_id = %record.invoice_id,
        invoice_number = record.invoice_number.as_deref().unwrap_or(""),
        "Invoice created"
    );
    Ok(InvoiceSync {
        invoice_id: record.invoice_id,
        invoice_number: record.invoice_number,
        invoice_status: record.status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{client_for, sample_customer, sample_order, settings};
    use crate::types::OrderStatus;
    use chrono::TimeZone;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[test]
    fn test_build_invoice_mapping() {
        let customer = sample_customer();
        let mut order = sample_order();
        order.delivered_at = Some(Utc.with_ymd_and_hms(2026, 3, 10, 22, 15, 0).unwrap());
        let today = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();

        let payload = serde_json::to_value(build_invoice(
            "contact-9",
            &customer,
            &order,
            &settings(),
            today,
        ))
        .unwrap();

        assert_eq!(payload["Type"], "ACCREC");
        assert_eq!(payload["Status"], "AUTHORISED");
        assert_eq!(payload["LineAmountTypes"], "Exclusive");
        assert_eq!(payload["Reference"], "SO-1001");
        assert_eq!(payload["Contact"], json!({"ContactID": "contact-9"}));
        assert_eq!(payload["Date"], "2026-03-10");
        // Net 20
        assert_eq!(payload["DueDate"], "2026-03-30");
        assert_eq!(
            payload["LineItems"],
            json!([
                {"Description": "Green tea", "Quantity": 2, "UnitAmount": 10.5,
                 "AccountCode": "200", "TaxType": "OUTPUT2", "ItemCode": "TEA-01"},
                {"Description": "Oat milk", "Quantity": 1, "UnitAmount": 9.99,
                 "AccountCode": "200", "TaxType": "OUTPUT2", "ItemCode": "MILK-02"}
            ])
        );
    }

    #[test]
    fn test_invoice_date_defaults_to_today() {
        let order = sample_order();
        let today = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        assert_eq!(invoice_date(&order, today), today);

        let mut customer = sample_customer();
        customer.payment_terms = None;
        let payload = build_invoice("c", &customer, &order, &settings(), today);
        assert_eq!(payload.due_date, NaiveDate::from_ymd_opt(2026, 5, 1).unwrap());
    }

    #[test]
    fn test_absurd_terms_fall_back_to_default_due_date() {
        let mut customer = sample_customer();
        customer.payment_terms = Some("Net 4000000000".to_string());
        let today = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        let payload = build_invoice("c", &customer, &sample_order(), &settings(), today);
        assert_eq!(payload.due_date, NaiveDate::from_ymd_opt(2026, 5, 1).unwrap());
    }

    #[tokio::test]
    async fn test_create_invoice() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api.xro/2.0/Invoices")
            .match_body(Matcher::PartialJson(json!({
                "Invoices": [{"Type": "ACCREC", "Reference": "SO-1001", "Contact": {"ContactID": "contact-9"}}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"Invoices":[{"InvoiceID":"inv-1","InvoiceNumber":"INV-0042","Status":"AUTHORISED"}]}"#)
            .expect(1)
            .create_async()
            .await;

        let mut customer = sample_customer();
        customer.external_contact_id = Some("contact-9".to_string());
        let client = client_for(&server.url());

        let result = create_invoice(&client, &settings(), &customer, &sample_order())
            .await
            .unwrap();
        assert_eq!(
            result,
            InvoiceSync {
                invoice_id: "inv-1".to_string(),
                invoice_number: Some("INV-0042".to_string()),
                invoice_status: Some("AUTHORISED".to_string()),
            }
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_preconditions_skip_network() {
        let mut server = Server::new_async().await;
        let any = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let client = client_for(&server.url());

        let err = create_invoice(&client, &settings(), &sample_customer(), &sample_order())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SyncError::CustomerNotSynced {
                customer_id: "cust-1".to_string()
            }
        );

        let mut customer = sample_customer();
        customer.external_contact_id = Some("contact-9".to_string());
        let mut order = sample_order();
        order.link.invoice_id = Some("inv-1".to_string());
        let err = create_invoice(&client, &settings(), &customer, &order)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SyncError::DuplicateInvoice {
                order_id: "order-1".to_string(),
                invoice_id: "inv-1".to_string()
            }
        );

        let mut order = sample_order();
        order.status = OrderStatus::Pending;
        let err = create_invoice(&client, &settings(), &customer, &order)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SyncError::InvalidOrderStatus {
                order_id: "order-1".to_string(),
                status: "pending".to_string(),
                document: "invoice".to_string(),
            }
        );

        any.assert_async().await;
    }
}
