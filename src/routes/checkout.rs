use anyhow::{Context, Result};
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    api::razorpay::{self, PaymentIntent},
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        config,
        middleware::{self},
    },
    models::{
        CreateOrderEntity, CreateOrderItemEntity, CreatePaymentEntity, OrderEntity,
        OrderItemEntity, PaymentEntity, ProductEntity,
    },
    schema::{order_items, orders, payments, products},
    shipping::ShippingAddress,
};

/// Custom orders charge a 70% advance at checkout; the balance is collected
/// once the artisan finishes production.
const ADVANCE_RATE: f32 = 0.70;

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/checkout",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(create_checkout))
            .routes(utoipa_axum::routes!(confirm_payment))
            .route_layer(axum::middleware::from_fn(
                middleware::customers_authorization,
            )),
    )
}

#[derive(Deserialize, ToSchema)]
struct CheckoutItemReq {
    product_id: i32,
    quantity: i32,
    size: Option<String>,
}

#[derive(Deserialize, ToSchema)]
struct CreateCheckoutReq {
    items: Vec<CheckoutItemReq>,
    shipping_address: ShippingAddress,
}

#[derive(Serialize, ToSchema)]
struct CreateCheckoutRes {
    order: OrderEntity,
    order_items: Vec<OrderItemEntity>,
    payment: PaymentEntity,
    intent: PaymentIntent,
    /// Public key the checkout widget is opened with.
    key_id: String,
}

/// Price the cart, snapshot it into an order and open the first charge on
/// the gateway. Custom orders only charge the advance here.
#[utoipa::path(
    post,
    path = "/",
    tags = ["Checkout"],
    security(("bearerAuth" = [])),
    request_body = CreateCheckoutReq,
    responses(
        (status = 200, description = "Checkout created", body = StdResponse<CreateCheckoutRes, String>)
    )
)]
async fn create_checkout(
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
    Json(body): Json<CreateCheckoutReq>,
) -> Result<impl IntoResponse, AppError> {
    if body.items.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".to_string()));
    }
    if body.items.iter().any(|item| item.quantity <= 0) {
        return Err(AppError::BadRequest(
            "Item quantities must be positive".to_string(),
        ));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product_ids: Vec<i32> = body.items.iter().map(|item| item.product_id).collect();
    let catalog: Vec<ProductEntity> = products::table
        .filter(products::id.eq_any(&product_ids))
        .get_results(conn)
        .await
        .context("Failed to load products")?;
    let catalog: HashMap<i32, ProductEntity> =
        catalog.into_iter().map(|p| (p.id, p)).collect();

    for item in &body.items {
        if !catalog.contains_key(&item.product_id) {
            return Err(AppError::BadRequest(format!(
                "Product {} does not exist",
                item.product_id
            )));
        }
    }

    let total: f32 = body
        .items
        .iter()
        .map(|item| catalog[&item.product_id].unit_price * item.quantity as f32)
        .sum();
    let is_custom = body
        .items
        .iter()
        .any(|item| catalog[&item.product_id].is_custom);

    let (first_charge, purpose, order_type) = if is_custom {
        let (advance, _balance) = advance_split(total);
        (advance, "ADVANCE", "custom")
    } else {
        (total, "FULL", "standard")
    };

    let shipping_address =
        serde_json::to_value(&body.shipping_address).context("Failed to encode address")?;

    let (order, created_items) = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let order: OrderEntity = diesel::insert_into(orders::table)
                    .values(CreateOrderEntity {
                        customer_id,
                        status: "PAYMENT_PENDING".into(),
                        order_type: order_type.into(),
                        shipping_address,
                        amount_total: total,
                        amount_paid: 0.0,
                        amount_pending: total,
                    })
                    .returning(OrderEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to create order")?;

                let items: Vec<CreateOrderItemEntity> = body
                    .items
                    .iter()
                    .map(|item| {
                        let product = &catalog[&item.product_id];
                        CreateOrderItemEntity {
                            order_id: order.id,
                            product_id: product.id,
                            name: product.name.clone(),
                            unit_price: product.unit_price,
                            quantity: item.quantity,
                            size: item.size.clone(),
                        }
                    })
                    .collect();

                let items = diesel::insert_into(order_items::table)
                    .values(items)
                    .returning(OrderItemEntity::as_returning())
                    .get_results(conn)
                    .await
                    .context("Failed to create order items")?;

                Ok::<(OrderEntity, Vec<OrderItemEntity>), anyhow::Error>((order, items))
            })
        })
        .await
        .context("Transaction failed")?;

    let intent = state
        .razorpay
        .create_payment_intent(first_charge, &format!("order_{}", order.id))
        .await?;

    let payment: PaymentEntity = diesel::insert_into(payments::table)
        .values(CreatePaymentEntity {
            order_id: order.id,
            purpose: purpose.into(),
            amount: first_charge,
            provider: "razorpay".into(),
            status: "PENDING".into(),
            provider_order_ref: Some(intent.id.clone()),
        })
        .returning(PaymentEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create payment")?;

    let key_id = config::require("RAZORPAY_KEY_ID")?;

    Ok(StdResponse {
        data: Some(CreateCheckoutRes {
            order,
            order_items: created_items,
            payment,
            intent,
            key_id,
        }),
        message: Some("Checkout created successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct ConfirmPaymentReq {
    payment_id: Uuid,
    provider_order_id: String,
    provider_payment_id: String,
    signature: String,
}

#[derive(Serialize, ToSchema)]
struct ConfirmPaymentRes {
    updated_order: OrderEntity,
    updated_payment: PaymentEntity,
}

/// Verify the checkout-widget callback and advance the order. The status an
/// order lands in depends on what the payment was for: full payments place
/// the order, advances queue it for artisan acceptance, balance payments
/// release it for shipping.
#[utoipa::path(
    post,
    path = "/{order_id}/confirm",
    tags = ["Checkout"],
    security(("bearerAuth" = [])),
    params(
        ("order_id" = i32, Path, description = "Order the payment belongs to")
    ),
    request_body = ConfirmPaymentReq,
    responses(
        (status = 200, description = "Payment confirmed", body = StdResponse<ConfirmPaymentRes, String>)
    )
)]
async fn confirm_payment(
    Path(order_id): Path<i32>,
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
    Json(body): Json<ConfirmPaymentReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let payment: PaymentEntity = payments::table
        .find(body.payment_id)
        .filter(payments::order_id.eq(order_id))
        .filter(payments::status.eq("PENDING"))
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;

    let order: OrderEntity = orders::table
        .find(order_id)
        .filter(orders::customer_id.eq(customer_id))
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;

    if payment.provider_order_ref.as_deref() != Some(body.provider_order_id.as_str()) {
        return Err(AppError::BadRequest(
            "Payment does not match this gateway order".to_string(),
        ));
    }

    let key_secret = config::require("RAZORPAY_KEY_SECRET")?;
    if !razorpay::verify_payment_signature(
        &body.provider_order_id,
        &body.provider_payment_id,
        &body.signature,
        &key_secret,
    ) {
        diesel::update(payments::table.find(payment.id))
            .set((
                payments::status.eq("FAILED"),
                payments::failure_reason.eq("Signature verification failed"),
            ))
            .execute(conn)
            .await
            .context("Failed to record payment failure")?;

        return Err(AppError::BadRequest(
            "Payment signature verification failed".to_string(),
        ));
    }

    let next_status = match payment.purpose.as_str() {
        "FULL" => "PLACED",
        "ADVANCE" => "PENDING_ACCEPTANCE",
        "BALANCE" => "READY_TO_SHIP",
        other => {
            return Err(AppError::Other(anyhow::anyhow!(
                "Payment {} has unknown purpose {other}",
                payment.id
            )));
        }
    };

    let amount_paid = order.amount_paid + payment.amount;
    let amount_pending = (order.amount_total - amount_paid).max(0.0);

    let (updated_order, updated_payment) = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let updated_payment = diesel::update(
                    payments::table
                        .find(payment.id)
                        .filter(payments::status.eq("PENDING")),
                )
                .set((
                    payments::status.eq("PAID"),
                    payments::provider_payment_ref.eq(body.provider_payment_id),
                ))
                .returning(PaymentEntity::as_returning())
                .get_result(conn)
                .await
                .context("Failed to update payment status")?;

                let updated_order = diesel::update(orders::table.find(order_id))
                    .set((
                        orders::status.eq(next_status),
                        orders::amount_paid.eq(amount_paid),
                        orders::amount_pending.eq(amount_pending),
                    ))
                    .returning(OrderEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to update order status")?;

                Ok::<(OrderEntity, PaymentEntity), AppError>((updated_order, updated_payment))
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(ConfirmPaymentRes {
            updated_order,
            updated_payment,
        }),
        message: Some("Payment confirmed successfully"),
    })
}

/// Splits a custom-order total into the advance charged at checkout and the
/// balance collected later, rounded to the paisa.
pub(crate) fn advance_split(total: f32) -> (f32, f32) {
    let advance = round_to_paise(total * ADVANCE_RATE);
    let balance = round_to_paise(total - advance);
    (advance, balance)
}

fn round_to_paise(amount: f32) -> f32 {
    ((f64::from(amount) * 100.0).round() / 100.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_split_is_seventy_thirty() {
        let (advance, balance) = advance_split(1000.0);
        assert_eq!(advance, 700.0);
        assert_eq!(balance, 300.0);
    }

    #[test]
    fn advance_split_rounds_to_the_paisa() {
        let (advance, balance) = advance_split(999.0);
        assert_eq!(advance, 699.3);
        assert_eq!(balance, 299.7);
    }

    #[test]
    fn advance_and_balance_cover_the_total() {
        for total in [1.0_f32, 49.99, 999.0, 2499.5, 123456.78] {
            let (advance, balance) = advance_split(total);
            assert!((f64::from(advance) + f64::from(balance) - f64::from(total)).abs() < 0.005);
        }
    }
}
