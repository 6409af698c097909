//! Customer → contact mapping and upsert.

use crate::mapping::parse_payment_terms;
use crate::payloads::{
    envelope, first_record, Address, ContactPayload, ContactsEnvelope, PaymentTerm, PaymentTerms,
    Phone, ADDRESS_POBOX, ADDRESS_STREET, PHONE_DEFAULT, PHONE_MOBILE,
    TERMS_DAYS_AFTER_BILL_DATE,
};
use crate::types::{Customer, PostalAddress};
use ledgerlink::{AccountingClient, SyncResult};
use reqwest::Method;
use tracing::{error, info};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContactSync {
    pub contact_id: String,
}

fn split_name(full_name: &str) -> (Option<String>, Option<String>) {
    let mut parts = full_name.split_whitespace();
    let first = parts.next().map(str::to_string);
    let rest = parts.collect::<Vec<_>>().join(" ");
    let last = if rest.is_empty() { None } else { Some(rest) };
    (first, last)
}

fn address(address_type: &str, source: &PostalAddress) -> Address {
    Address {
        address_type: address_type.to_string(),
        address_line1: source.line1.clone(),
        address_line2: source.line2.clone(),
        city: source.city.clone(),
        region: source.region.clone(),
        postal_code: source.postal_code.clone(),
        country: source.country.clone(),
    }
}

fn phone(phone_type: &str, number: &str) -> Phone {
    Phone {
        phone_type: phone_type.to_string(),
        phone_number: number.to_string(),
    }
}

/// Build the contact body for a customer.
///
/// Both a street (delivery) and a PO box (billing, else delivery) address are
/// always sent. Payment terms are omitted unless a day count can be parsed.
pub fn build_contact(customer: &Customer) -> ContactPayload {
    let name = if customer.business_name.trim().is_empty() {
        customer.contact_person.clone().unwrap_or_default()
    } else {
        customer.business_name.clone()
    };

    let (first_name, last_name) = customer
        .contact_person
        .as_deref()
        .map(split_name)
        .unwrap_or((None, None));

    let mut phones = Vec::new();
    if let Some(number) = customer.phone.as_deref().filter(|n| !n.trim().is_empty()) {
        phones.push(phone(PHONE_DEFAULT, number));
    }
    if let Some(number) = customer.mobile.as_deref().filter(|n| !n.trim().is_empty()) {
        phones.push(phone(PHONE_MOBILE, number));
    }

    let billing = customer
        .billing_address
        .as_ref()
        .unwrap_or(&customer.delivery_address);
    let addresses = vec![
        address(ADDRESS_STREET, &customer.delivery_address),
        address(ADDRESS_POBOX, billing),
    ];

    let payment_terms = customer
        .payment_terms
        .as_deref()
        .and_then(parse_payment_terms)
        .map(|day| {
            let term = PaymentTerm {
                day,
                term_type: TERMS_DAYS_AFTER_BILL_DATE.to_string(),
            };
            PaymentTerms {
                bills: term.clone(),
                sales: term,
            }
        });

    ContactPayload {
        contact_id: customer.external_contact_id.clone(),
        name,
        first_name,
        last_name,
        email_address: customer.email.clone(),
        phones,
        addresses,
        payment_terms,
    }
}

/// Create the contact, or update it in place when the customer already
/// carries an external contact id.
pub async fn sync_contact(client: &AccountingClient, customer: &Customer) -> SyncResult<ContactSync> {
    let payload = build_contact(customer);
    let body = envelope("Contacts", std::slice::from_ref(&payload))?;
    let path = match &customer.external_contact_id {
        Some(id) => format!("Contacts/{}", id),
        None => "Contacts".to_string(),
    };

    let response: ContactsEnvelope = client
        .request_json(Method::POST, &path, Some(&body))
        .await
        .map_err(|e| {
            error!(customer_id = %customer.id, error = %e, "Contact sync failed");
            e
        })?;
    let record = first_record(response.contacts, "Contacts")?;

    info!(
        customer_id = %customer.id,
        contact_id = %record.contact_id,
        updated = customer.external_contact_id.is_some(),
        "Contact synced"
    );
    Ok(ContactSync {
        contact_id: record.contact_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{client_expiring_in, client_for, sample_customer};
    use chrono::Duration;
    use ledgerlink::SyncError;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[test]
    fn test_build_contact_full_mapping() {
        let mut customer = sample_customer();
        customer.mobile = Some("021 555 0101".to_string());
        customer.billing_address = Some(PostalAddress {
            line1: "PO Box 77".to_string(),
            city: Some("Wellington".to_string()),
            ..Default::default()
        });

        let payload = serde_json::to_value(build_contact(&customer)).unwrap();
        assert_eq!(payload["Name"], "Harbour Cafe");
        assert_eq!(payload["FirstName"], "Mere");
        assert_eq!(payload["LastName"], "van der Berg");
        assert_eq!(payload["EmailAddress"], "orders@harbour.example");
        assert_eq!(
            payload["Phones"],
            json!([
                {"PhoneType": "DEFAULT", "PhoneNumber": "04 555 0100"},
                {"PhoneType": "MOBILE", "PhoneNumber": "021 555 0101"}
            ])
        );
        assert_eq!(payload["Addresses"][0]["AddressType"], "STREET");
        assert_eq!(payload["Addresses"][0]["AddressLine1"], "1 Quay St");
        assert_eq!(payload["Addresses"][1]["AddressType"], "POBOX");
        assert_eq!(payload["Addresses"][1]["AddressLine1"], "PO Box 77");
        assert_eq!(
            payload["PaymentTerms"],
            json!({
                "Bills": {"Day": 20, "Type": "DAYSAFTERBILLDATE"},
                "Sales": {"Day": 20, "Type": "DAYSAFTERBILLDATE"}
            })
        );
        assert!(payload.get("ContactID").is_none());
    }

    #[test]
    fn test_billing_falls_back_to_delivery() {
        let customer = sample_customer();
        let payload = build_contact(&customer);
        assert_eq!(payload.addresses.len(), 2);
        assert_eq!(payload.addresses[1].address_type, ADDRESS_POBOX);
        assert_eq!(payload.addresses[1].address_line1, "1 Quay St");
    }

    #[test]
    fn test_unparseable_terms_are_omitted() {
        let mut customer = sample_customer();
        customer.payment_terms = Some("Cash on delivery".to_string());
        let payload = serde_json::to_value(build_contact(&customer)).unwrap();
        assert!(payload.get("PaymentTerms").is_none());
    }

    #[test]
    fn test_name_falls_back_to_contact_person() {
        let mut customer = sample_customer();
        customer.business_name = "  ".to_string();
        customer.contact_person = Some("Aroha".to_string());
        let payload = build_contact(&customer);
        assert_eq!(payload.name, "Aroha");
        assert_eq!(payload.first_name.as_deref(), Some("Aroha"));
        assert!(payload.last_name.is_none());
    }

    #[tokio::test]
    async fn test_creates_contact_when_unlinked() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api.xro/2.0/Contacts")
            .match_body(Matcher::PartialJson(json!({"Contacts": [{"Name": "Harbour Cafe"}]})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"Contacts":[{"ContactID":"contact-9"}]}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let result = sync_contact(&client, &sample_customer()).await.unwrap();
        assert_eq!(result.contact_id, "contact-9");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_updates_existing_contact() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api.xro/2.0/Contacts/contact-9")
            .match_body(Matcher::PartialJson(json!({"Contacts": [{"ContactID": "contact-9"}]})))
            .with_status(200)
            .with_body(r#"{"Contacts":[{"ContactID":"contact-9"}]}"#)
            .expect(1)
            .create_async()
            .await;

        let mut customer = sample_customer();
        customer.external_contact_id = Some("contact-9".to_string());
        let client = client_for(&server.url());
        let result = sync_contact(&client, &customer).await.unwrap();
        assert_eq!(result.contact_id, "contact-9");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_stale_token_is_refreshed_transparently() {
        let mut server = Server::new_async().await;
        let refresh = server
            .mock("POST", "/connect/token")
            .match_body(Matcher::UrlEncoded("refresh_token".into(), "refresh-1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"access-2","refresh_token":"refresh-2","expires_in":1800}"#)
            .expect(1)
            .create_async()
            .await;
        let contacts = server
            .mock("POST", "/api.xro/2.0/Contacts")
            .match_header("authorization", "Bearer access-2")
            .with_status(200)
            .with_body(r#"{"Contacts":[{"ContactID":"contact-9"}]}"#)
            .expect(1)
            .create_async()
            .await;

        // 4m59s left is inside the refresh buffer
        let client = client_expiring_in(&server.url(), Duration::seconds(299));
        let result = sync_contact(&client, &sample_customer()).await.unwrap();
        assert_eq!(result.contact_id, "contact-9");
        refresh.assert_async().await;
        contacts.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_failure_is_typed() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api.xro/2.0/Contacts")
            .with_status(400)
            .with_body(r#"{"Message":"Name is required"}"#)
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = sync_contact(&client, &sample_customer()).await.unwrap_err();
        match err {
            SyncError::ExternalApi { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("Name is required"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
