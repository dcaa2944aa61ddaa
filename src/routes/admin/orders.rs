use anyhow::{Context, Result};
use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        middleware::{self},
    },
    models::{OrderEntity, OrderItemEntity, PaymentEntity, UpdateTrackingEntity},
    schema::{order_items, orders, payments},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/admin/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_orders))
            .routes(utoipa_axum::routes!(get_order))
            .routes(utoipa_axum::routes!(override_status))
            .routes(utoipa_axum::routes!(override_tracking))
            .routes(utoipa_axum::routes!(flag_order))
            .routes(utoipa_axum::routes!(unflag_order))
            .route_layer(axum::middleware::from_fn(middleware::admins_authorization)),
    )
}

#[derive(Serialize, ToSchema)]
struct GetOrderRes {
    pub order: OrderEntity,
    pub order_items: Vec<OrderItemEntity>,
}

#[derive(Serialize, ToSchema)]
struct GetOrderDetailRes {
    pub order: OrderEntity,
    pub order_items: Vec<OrderItemEntity>,
    pub payments: Vec<PaymentEntity>,
}

/// Fetch all orders in the system.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List all orders", body = StdResponse<Vec<GetOrderRes>, String>)
    )
)]
async fn get_orders(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let orders: Vec<OrderEntity> = orders::table
        .order_by(orders::updated_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get orders")?;

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
        message: Some("Get orders successfully"),
    })
}

/// Fetch one order with its items and payment history.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to fetch")
    ),
    responses(
        (status = 200, description = "Get order successfully", body = StdResponse<GetOrderDetailRes, String>)
    )
)]
async fn get_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order: OrderEntity = orders::table
        .find(id)
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;

    let order_items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq(order.id))
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    let payments: Vec<PaymentEntity> = payments::table
        .filter(payments::order_id.eq(order.id))
        .order_by(payments::created_at.asc())
        .get_results(conn)
        .await
        .context("Failed to get payments")?;

    Ok(StdResponse {
        data: Some(GetOrderDetailRes {
            order,
            order_items,
            payments,
        }),
        message: Some("Get order successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct OverrideStatusReq {
    status: String,
}

/// Manual status override from the admin console. The column is free-text
/// on purpose; the console historically writes values the service never
/// does.
#[utoipa::path(
    patch,
    path = "/{id}/status",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to update")
    ),
    request_body = OverrideStatusReq,
    responses(
        (status = 200, description = "Status updated", body = StdResponse<OrderEntity, String>)
    )
)]
async fn override_status(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Json(body): Json<OverrideStatusReq>,
) -> Result<impl IntoResponse, AppError> {
    if body.status.trim().is_empty() {
        return Err(AppError::BadRequest("Status must not be empty".to_string()));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let updated_order: OrderEntity = diesel::update(orders::table.find(id))
        .set(orders::status.eq(body.status))
        .returning(OrderEntity::as_returning())
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;

    Ok(StdResponse {
        data: Some(updated_order),
        message: Some("Status updated successfully"),
    })
}

/// Manual tracking override; only the fields supplied are touched.
#[utoipa::path(
    patch,
    path = "/{id}/tracking",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to update")
    ),
    request_body = UpdateTrackingEntity,
    responses(
        (status = 200, description = "Tracking updated", body = StdResponse<OrderEntity, String>)
    )
)]
async fn override_tracking(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Json(body): Json<UpdateTrackingEntity>,
) -> Result<impl IntoResponse, AppError> {
    if body.courier_order_id.is_none()
        && body.shipment_id.is_none()
        && body.awb_code.is_none()
        && body.courier_name.is_none()
    {
        return Err(AppError::BadRequest("Nothing to update".to_string()));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let updated_order: OrderEntity = diesel::update(orders::table.find(id))
        .set(body)
        .returning(OrderEntity::as_returning())
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;

    Ok(StdResponse {
        data: Some(updated_order),
        message: Some("Tracking updated successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct FlagOrderReq {
    reason: String,
}

/// Flag an order for manual review.
#[utoipa::path(
    post,
    path = "/{id}/flag",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to flag")
    ),
    request_body = FlagOrderReq,
    responses(
        (status = 200, description = "Order flagged", body = StdResponse<OrderEntity, String>)
    )
)]
async fn flag_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Json(body): Json<FlagOrderReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let updated_order: OrderEntity = diesel::update(orders::table.find(id))
        .set((
            orders::flagged.eq(true),
            orders::flag_reason.eq(Some(body.reason)),
        ))
        .returning(OrderEntity::as_returning())
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;

    Ok(StdResponse {
        data: Some(updated_order),
        message: Some("Order flagged successfully"),
    })
}

/// Clear an order's review flag.
#[utoipa::path(
    delete,
    path = "/{id}/flag",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to unflag")
    ),
    responses(
        (status = 200, description = "Order unflagged", body = StdResponse<OrderEntity, String>)
    )
)]
async fn unflag_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let updated_order: OrderEntity = diesel::update(orders::table.find(id))
        .set((
            orders::flagged.eq(false),
            orders::flag_reason.eq(None::<String>),
        ))
        .returning(OrderEntity::as_returning())
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;

    Ok(StdResponse {
        data: Some(updated_order),
        message: Some("Order unflagged successfully"),
    })
}
