use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::{
    api::shiprocket::{AddPickupLocationRequest, ShipmentOrderItem, ShipmentOrderRequest},
    models::{OrderEntity, OrderItemEntity},
};

/// Shiprocket truncates pickup nicknames at 36 characters.
const PICKUP_CODE_MAX: usize = 36;
const NAME_MAX: usize = 50;
const ADDRESS_MAX: usize = 120;

pub const DEFAULT_COUNTRY: &str = "India";
/// Items snapshotted with a zero price (legacy custom quotes) still need a
/// declared value on the label.
pub const FALLBACK_ITEM_PRICE: f32 = 100.0;

// Parcel defaults; real dimensions are not captured at checkout.
const PARCEL_WEIGHT_KG: f32 = 0.5;
const PARCEL_DIMENSION_CM: f32 = 10.0;

/// Address snapshot stored on the order at checkout.
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct ShippingAddress {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    #[serde(default)]
    pub address_2: String,
    pub city: String,
    pub state: String,
    #[serde(default)]
    pub country: String,
    pub pincode: String,
}

/// Artisan pickup address as kept on the profile. All fields default so a
/// partially filled form still parses and we can report what is missing.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PickupAddress {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub address_2: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub pincode: String,
}

impl PickupAddress {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.phone.trim().is_empty() {
            missing.push("phone");
        }
        if self.address.trim().is_empty() {
            missing.push("address");
        }
        if self.city.trim().is_empty() {
            missing.push("city");
        }
        if self.state.trim().is_empty() {
            missing.push("state");
        }
        if self.pincode.trim().is_empty() {
            missing.push("pincode");
        }
        missing
    }
}

/// Parses the artisan's stored pickup address, reporting absent or incomplete
/// data as a human-readable error. Callers must not touch the courier API
/// when this fails.
pub fn parse_pickup_address(value: Option<&Value>) -> Result<PickupAddress, String> {
    let value = value.ok_or_else(|| "Artisan has no pickup address on file".to_string())?;
    let address: PickupAddress = serde_json::from_value(value.clone())
        .map_err(|err| format!("Artisan pickup address is malformed: {err}"))?;

    let missing = address.missing_fields();
    if !missing.is_empty() {
        return Err(format!(
            "Artisan pickup address is incomplete: missing {}",
            missing.join(", ")
        ));
    }

    Ok(address)
}

/// Derives the courier-side pickup nickname for an artisan: the email with
/// everything but ASCII alphanumerics stripped, lowercased and truncated.
pub fn pickup_code_for_email(email: &str) -> String {
    email
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .take(PICKUP_CODE_MAX)
        .collect()
}

pub fn pickup_location_request(code: &str, email: &str, address: &PickupAddress) -> AddPickupLocationRequest {
    AddPickupLocationRequest {
        pickup_location: code.to_string(),
        name: truncate(&address.name, NAME_MAX),
        email: email.to_string(),
        phone: address.phone.clone(),
        address: truncate(&address.address, ADDRESS_MAX),
        address_2: truncate(&address.address_2, ADDRESS_MAX),
        city: address.city.clone(),
        state: address.state.clone(),
        country: country_or_default(&address.country),
        pin_code: address.pincode.clone(),
    }
}

/// Maps an order and its item snapshots onto the courier's order payload.
pub fn build_shipment_request(
    order: &OrderEntity,
    items: &[OrderItemEntity],
    pickup_location: &str,
) -> Result<ShipmentOrderRequest, String> {
    let address: ShippingAddress = serde_json::from_value(order.shipping_address.clone())
        .map_err(|err| format!("Order shipping address is malformed: {err}"))?;

    let (first_name, last_name) = split_name(&address.name);

    let order_items = items
        .iter()
        .map(|item| ShipmentOrderItem {
            name: truncate(&item.name, NAME_MAX),
            sku: match &item.size {
                Some(size) => format!("CB-{}-{}", item.product_id, size),
                None => format!("CB-{}", item.product_id),
            },
            units: item.quantity,
            selling_price: if item.unit_price > 0.0 {
                item.unit_price
            } else {
                FALLBACK_ITEM_PRICE
            },
        })
        .collect();

    Ok(ShipmentOrderRequest {
        order_id: order.id.to_string(),
        order_date: order.created_at.format("%Y-%m-%d %H:%M").to_string(),
        pickup_location: pickup_location.to_string(),
        billing_customer_name: truncate(&first_name, NAME_MAX),
        billing_last_name: truncate(&last_name, NAME_MAX),
        billing_address: truncate(&address.address, ADDRESS_MAX),
        billing_address_2: truncate(&address.address_2, ADDRESS_MAX),
        billing_city: address.city,
        billing_pincode: address.pincode,
        billing_state: address.state,
        billing_country: country_or_default(&address.country),
        billing_email: address.email,
        billing_phone: address.phone,
        shipping_is_billing: true,
        order_items,
        payment_method: "Prepaid".to_string(),
        sub_total: order.amount_total,
        length: PARCEL_DIMENSION_CM,
        breadth: PARCEL_DIMENSION_CM,
        height: PARCEL_DIMENSION_CM,
        weight: PARCEL_WEIGHT_KG,
    })
}

fn country_or_default(country: &str) -> String {
    if country.trim().is_empty() {
        DEFAULT_COUNTRY.to_string()
    } else {
        country.to_string()
    }
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn split_name(full_name: &str) -> (String, String) {
    match full_name.trim().split_once(' ') {
        Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
        None => (full_name.trim().to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;

    fn order_with_address(address: Value) -> OrderEntity {
        OrderEntity {
            id: 311,
            customer_id: 12,
            status: "READY_TO_SHIP".to_string(),
            order_type: "custom".to_string(),
            shipping_address: address,
            amount_total: 2499.0,
            amount_paid: 2499.0,
            amount_pending: 0.0,
            artisan_id: Some(7),
            courier_order_id: None,
            shipment_id: None,
            awb_code: None,
            courier_name: None,
            flagged: false,
            flag_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn item(name: &str, unit_price: f32, quantity: i32) -> OrderItemEntity {
        OrderItemEntity {
            id: 1,
            order_id: 311,
            product_id: 88,
            name: name.to_string(),
            unit_price,
            quantity,
            size: None,
            created_at: Utc::now(),
        }
    }

    fn full_address() -> Value {
        json!({
            "name": "Priya Raghavan",
            "email": "priya@example.com",
            "phone": "9876543210",
            "address": "14 Temple Street",
            "city": "Madurai",
            "state": "Tamil Nadu",
            "pincode": "625001"
        })
    }

    #[test]
    fn pickup_code_strips_and_truncates() {
        assert_eq!(
            pickup_code_for_email("Asha.Crafts+studio@gmail.com"),
            "ashacraftsstudiogmailcom"
        );

        let long = format!("{}@example.com", "a".repeat(60));
        assert_eq!(pickup_code_for_email(&long).len(), 36);
    }

    #[test]
    fn incomplete_pickup_address_names_the_gaps() {
        let err = parse_pickup_address(Some(&json!({
            "name": "Asha",
            "phone": "9876543210",
            "address": "7 Loom Lane"
        })))
        .unwrap_err();

        assert!(err.contains("city"));
        assert!(err.contains("state"));
        assert!(err.contains("pincode"));
    }

    #[test]
    fn absent_pickup_address_is_an_error() {
        assert!(parse_pickup_address(None).is_err());
    }

    #[test]
    fn complete_pickup_address_parses() {
        let address = parse_pickup_address(Some(&json!({
            "name": "Asha",
            "phone": "9876543210",
            "address": "7 Loom Lane",
            "city": "Jaipur",
            "state": "Rajasthan",
            "pincode": "302001"
        })))
        .unwrap();

        assert_eq!(address.city, "Jaipur");
    }

    #[test]
    fn country_defaults_when_absent() {
        let order = order_with_address(full_address());
        let request = build_shipment_request(&order, &[item("Brass Lamp", 2499.0, 1)], "primary")
            .unwrap();

        assert_eq!(request.billing_country, "India");
        assert_eq!(request.billing_customer_name, "Priya");
        assert_eq!(request.billing_last_name, "Raghavan");
        assert_eq!(request.pickup_location, "primary");
        assert_eq!(request.order_id, "311");
    }

    #[test]
    fn zero_priced_items_get_the_fallback_price() {
        let order = order_with_address(full_address());
        let request =
            build_shipment_request(&order, &[item("Sample Swatch", 0.0, 2)], "primary").unwrap();

        assert_eq!(request.order_items[0].selling_price, FALLBACK_ITEM_PRICE);
        assert_eq!(request.order_items[0].units, 2);
    }

    #[test]
    fn long_item_names_are_truncated() {
        let order = order_with_address(full_address());
        let long_name = "Hand-carved rosewood elephant with inlay work and ".repeat(3);
        let request =
            build_shipment_request(&order, &[item(&long_name, 900.0, 1)], "primary").unwrap();

        assert_eq!(request.order_items[0].name.chars().count(), 50);
    }

    #[test]
    fn malformed_address_is_an_error() {
        let order = order_with_address(json!({ "name": "No contact" }));
        assert!(build_shipment_request(&order, &[], "primary").is_err());
    }
}
