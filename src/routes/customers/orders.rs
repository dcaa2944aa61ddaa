use anyhow::{Context, Result};
use axum::{
    Extension,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, QueryResult, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    api::razorpay::PaymentIntent,
    core::{
        aliases::DieselError,
        app_error::{AppError, StdResponse},
        app_state::AppState,
        config,
        middleware::{self},
    },
    models::{CreatePaymentEntity, OrderEntity, OrderItemEntity, PaymentEntity},
    schema::{order_items, orders, payments},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/customers/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_my_orders))
            .routes(utoipa_axum::routes!(get_order))
            .routes(utoipa_axum::routes!(cancel_order))
            .routes(utoipa_axum::routes!(create_balance_payment))
            .route_layer(axum::middleware::from_fn(
                middleware::customers_authorization,
            )),
    )
}

#[derive(Serialize, ToSchema)]
struct GetOrderRes {
    pub order: OrderEntity,
    pub order_items: Vec<OrderItemEntity>,
}

/// Fetch all orders belonging to the authenticated customer.
#[utoipa::path(
    get,
    path = "/my-orders",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List my orders", body = StdResponse<Vec<GetOrderRes>, String>)
    )
)]
async fn get_my_orders(
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let orders: Vec<OrderEntity> = orders::table
        .filter(orders::customer_id.eq(customer_id))
        .order_by(orders::updated_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get my orders")?;

    let order_ids: Vec<i32> = orders.iter().map(|order| order.id).collect();
    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq_any(&order_ids))
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    let mut group: HashMap<i32, Vec<OrderItemEntity>> = HashMap::new();
    for item in items {
        group.entry(item.order_id).or_default().push(item);
    }

    let orders_with_items: Vec<GetOrderRes> = orders
        .into_iter()
        .map(|order| GetOrderRes {
            order_items: group.remove(&order.id).unwrap_or_default(),
            order,
        })
        .collect();

    Ok(StdResponse {
        data: Some(orders_with_items),
        message: Some("Get my orders successfully"),
    })
}

/// Fetch a specific order belonging to the authenticated customer.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to fetch")
    ),
    responses(
        (status = 200, description = "Get order successfully", body = StdResponse<GetOrderRes, String>)
    )
)]
async fn get_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order: QueryResult<OrderEntity> = orders::table
        .find(id)
        .filter(orders::customer_id.eq(customer_id))
        .get_result(conn)
        .await;

    if let Err(err) = order {
        match err {
            DieselError::NotFound => return Err(AppError::NotFound),
            _ => return Err(AppError::Other(err.into())),
        }
    }

    let order = order.unwrap();
    let order_items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq(order.id))
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    Ok(StdResponse {
        data: Some(GetOrderRes { order, order_items }),
        message: Some("Get order successfully"),
    })
}

/// Cancel an order that has not entered production yet.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to cancel")
    ),
    responses(
        (status = 200, description = "Cancelled order successfully", body = StdResponse<OrderEntity, String>)
    )
)]
async fn cancel_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cancelled_order: OrderEntity = diesel::update(
        orders::table
            .find(id)
            .filter(orders::customer_id.eq(customer_id))
            .filter(orders::status.eq_any(["PAYMENT_PENDING", "PENDING_ACCEPTANCE"])),
    )
    .set(orders::status.eq("CANCELLED"))
    .returning(OrderEntity::as_returning())
    .get_result(conn)
    .await
    .map_err(|_| AppError::NotFound)?;

    Ok(StdResponse {
        data: Some(cancelled_order),
        message: Some("Cancelled order successfully"),
    })
}

#[derive(Serialize, ToSchema)]
struct BalancePaymentRes {
    payment: PaymentEntity,
    intent: PaymentIntent,
    key_id: String,
}

/// Open the balance charge for a custom order once production is done.
#[utoipa::path(
    post,
    path = "/{id}/balance-payment",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to collect the balance for")
    ),
    responses(
        (status = 200, description = "Balance payment created", body = StdResponse<BalancePaymentRes, String>)
    )
)]
async fn create_balance_payment(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order: OrderEntity = orders::table
        .find(id)
        .filter(orders::customer_id.eq(customer_id))
        .filter(orders::status.eq("BALANCE_PENDING"))
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;

    if order.amount_pending <= 0.0 {
        return Err(AppError::BadRequest(
            "Nothing is owed on this order".to_string(),
        ));
    }

    let intent = state
        .razorpay
        .create_payment_intent(order.amount_pending, &format!("order_{}_balance", order.id))
        .await?;

    let payment: PaymentEntity = diesel::insert_into(payments::table)
        .values(CreatePaymentEntity {
            order_id: order.id,
            purpose: "BALANCE".into(),
            amount: order.amount_pending,
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
        data: Some(BalancePaymentRes {
            payment,
            intent,
            key_id,
        }),
        message: Some("Balance payment created successfully"),
    })
}
