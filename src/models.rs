use chrono::{DateTime, Utc};
use diesel::{
    Selectable,
    prelude::{AsChangeset, Identifiable, Insertable, Queryable},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

// Catalog

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::categories)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CategoryEntity {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductEntity {
    pub id: i32,
    pub category_id: Option<i32>,
    pub name: String,
    pub description: Option<String>,
    pub unit_price: f32,
    /// Size labels offered for this product, e.g. `["S", "M", "L"]`.
    pub sizes: Value,
    pub is_custom: bool,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Users

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserEntity {
    pub id: i32,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
    pub zone: Option<String>,
    pub pickup_address: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Deserialize, Debug)]
#[diesel(table_name = crate::schema::users)]
pub struct UpsertUserEntity {
    pub id: i32,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
}

#[derive(AsChangeset, Deserialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::users)]
pub struct UpdateUserEntity {
    pub zone: Option<String>,
    pub pickup_address: Option<Value>,
}

// Orders

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderEntity {
    pub id: i32,
    pub customer_id: i32,
    pub status: String,
    pub order_type: String,
    pub shipping_address: Value,
    pub amount_total: f32,
    pub amount_paid: f32,
    pub amount_pending: f32,
    pub artisan_id: Option<i32>,
    pub courier_order_id: Option<String>,
    pub shipment_id: Option<String>,
    pub awb_code: Option<String>,
    pub courier_name: Option<String>,
    pub flagged: bool,
    pub flag_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CreateOrderEntity {
    pub customer_id: i32,
    pub status: String,
    pub order_type: String,
    pub shipping_address: Value,
    pub amount_total: f32,
    pub amount_paid: f32,
    pub amount_pending: f32,
}

#[derive(AsChangeset, Deserialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::orders)]
pub struct UpdateTrackingEntity {
    pub courier_order_id: Option<String>,
    pub shipment_id: Option<String>,
    pub awb_code: Option<String>,
    pub courier_name: Option<String>,
}

#[derive(Queryable, Selectable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemEntity {
    pub id: i32,
    pub order_id: i32,
    pub product_id: i32,
    pub name: String,
    pub unit_price: f32,
    pub quantity: i32,
    pub size: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::order_items)]
pub struct CreateOrderItemEntity {
    pub order_id: i32,
    pub product_id: i32,
    pub name: String,
    pub unit_price: f32,
    pub quantity: i32,
    pub size: Option<String>,
}

// Payments

#[derive(Queryable, Serialize, Selectable, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::payments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PaymentEntity {
    pub id: Uuid,
    pub order_id: i32,
    pub purpose: String,
    pub amount: f32,
    pub status: String,
    pub provider: String,
    pub provider_order_ref: Option<String>,
    pub provider_payment_ref: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Serialize, Deserialize, Debug)]
#[diesel(table_name = crate::schema::payments)]
pub struct CreatePaymentEntity {
    pub order_id: i32,
    pub purpose: String,
    pub amount: f32,
    pub provider: String,
    pub status: String,
    pub provider_order_ref: Option<String>,
}

// Chats

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::chats)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ChatEntity {
    pub id: String,
    pub customer_id: i32,
    pub artisan_id: Option<i32>,
    pub product_id: Option<i32>,
    pub order_id: Option<i32>,
    pub hijacked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::chats)]
pub struct CreateChatEntity {
    pub id: String,
    pub customer_id: i32,
    pub artisan_id: Option<i32>,
    pub product_id: Option<i32>,
    pub order_id: Option<i32>,
}

#[derive(Queryable, Selectable, Serialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::chat_messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ChatMessageEntity {
    pub id: i32,
    pub chat_id: String,
    pub sender_id: i32,
    pub sender_role: String,
    pub kind: String,
    pub body: Option<String>,
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::chat_messages)]
pub struct CreateChatMessageEntity {
    pub chat_id: String,
    pub sender_id: i32,
    pub sender_role: String,
    pub kind: String,
    pub body: Option<String>,
    pub media_url: Option<String>,
}
