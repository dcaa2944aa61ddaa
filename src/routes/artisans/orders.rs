use anyhow::{Context, Result};
use axum::{
    Extension,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        middleware::{self},
    },
    models::{OrderEntity, OrderItemEntity},
    schema::{order_items, orders},
    shipping::ShippingAddress,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/artisans/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_feed))
            .routes(utoipa_axum::routes!(accept_order))
            .routes(utoipa_axum::routes!(get_my_assignments))
            .routes(utoipa_axum::routes!(finish_production))
            .route_layer(axum::middleware::from_fn(
                middleware::artisans_authorization,
            )),
    )
}

#[derive(Serialize, ToSchema)]
struct FeedOrderRes {
    pub order: OrderEntity,
    pub order_items: Vec<OrderItemEntity>,
}

#[derive(Deserialize, IntoParams)]
struct FeedFilter {
    /// Restrict the feed to orders shipping to this state.
    zone: Option<String>,
}

/// Custom orders open for acceptance, newest first.
#[utoipa::path(
    get,
    path = "/feed",
    tags = ["Artisans"],
    security(("bearerAuth" = [])),
    params(FeedFilter),
    responses(
        (status = 200, description = "Orders open for acceptance", body = StdResponse<Vec<FeedOrderRes>, String>)
    )
)]
async fn get_feed(
    Query(filter): Query<FeedFilter>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let open_orders: Vec<OrderEntity> = orders::table
        .filter(orders::status.eq("PENDING_ACCEPTANCE"))
        .filter(orders::order_type.eq("custom"))
        .order_by(orders::created_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get open orders")?;

    // Zone matching runs in memory against the shipping snapshot; the
    // destination state is buried in jsonb.
    let open_orders: Vec<OrderEntity> = match filter.zone {
        Some(zone) => open_orders
            .into_iter()
            .filter(|order| {
                serde_json::from_value::<ShippingAddress>(order.shipping_address.clone())
                    .map(|address| address.state.eq_ignore_ascii_case(&zone))
                    .unwrap_or(false)
            })
            .collect(),
        None => open_orders,
    };

    let order_ids: Vec<i32> = open_orders.iter().map(|order| order.id).collect();
    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq_any(&order_ids))
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    let mut group: HashMap<i32, Vec<OrderItemEntity>> = HashMap::new();
    for item in items {
        group.entry(item.order_id).or_default().push(item);
    }

    let feed: Vec<FeedOrderRes> = open_orders
        .into_iter()
        .map(|order| FeedOrderRes {
            order_items: group.remove(&order.id).unwrap_or_default(),
            order,
        })
        .collect();

    Ok(StdResponse {
        data: Some(feed),
        message: Some("Get feed successfully"),
    })
}

/// Claim an open custom order. The claim is a conditional update, so when
/// two artisans race only the first write lands; the other request comes
/// back with a conflict.
#[utoipa::path(
    post,
    path = "/{id}/accept",
    tags = ["Artisans"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to claim")
    ),
    responses(
        (status = 200, description = "Order claimed", body = StdResponse<OrderEntity, String>),
        (status = 409, description = "Order already claimed")
    )
)]
async fn accept_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(artisan_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let accepted_order: OrderEntity = diesel::update(
        orders::table
            .find(id)
            .filter(orders::status.eq("PENDING_ACCEPTANCE"))
            .filter(orders::artisan_id.is_null()),
    )
    .set((
        orders::artisan_id.eq(artisan_id),
        orders::status.eq("IN_PRODUCTION"),
    ))
    .returning(OrderEntity::as_returning())
    .get_result(conn)
    .await
    .map_err(|_| {
        AppError::Conflict("Order is no longer open for acceptance".to_string())
    })?;

    Ok(StdResponse {
        data: Some(accepted_order),
        message: Some("Order claimed successfully"),
    })
}

/// Orders assigned to the authenticated artisan.
#[utoipa::path(
    get,
    path = "/my",
    tags = ["Artisans"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List my assignments", body = StdResponse<Vec<FeedOrderRes>, String>)
    )
)]
async fn get_my_assignments(
    State(state): State<AppState>,
    Extension(artisan_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let assigned: Vec<OrderEntity> = orders::table
        .filter(orders::artisan_id.eq(artisan_id))
        .order_by(orders::updated_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get assignments")?;

    let order_ids: Vec<i32> = assigned.iter().map(|order| order.id).collect();
    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq_any(&order_ids))
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    let mut group: HashMap<i32, Vec<OrderItemEntity>> = HashMap::new();
    for item in items {
        group.entry(item.order_id).or_default().push(item);
    }

    let assignments: Vec<FeedOrderRes> = assigned
        .into_iter()
        .map(|order| FeedOrderRes {
            order_items: group.remove(&order.id).unwrap_or_default(),
            order,
        })
        .collect();

    Ok(StdResponse {
        data: Some(assignments),
        message: Some("Get my assignments successfully"),
    })
}

/// Mark production as finished. Orders still owing a balance wait for the
/// customer to pay it; fully paid orders go straight to the shipping queue.
#[utoipa::path(
    post,
    path = "/{id}/ready",
    tags = ["Artisans"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID that finished production")
    ),
    responses(
        (status = 200, description = "Order marked ready", body = StdResponse<OrderEntity, String>)
    )
)]
async fn finish_production(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(artisan_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order: OrderEntity = orders::table
        .find(id)
        .filter(orders::artisan_id.eq(artisan_id))
        .filter(orders::status.eq("IN_PRODUCTION"))
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;

    let next_status = if order.amount_pending > 0.0 {
        "BALANCE_PENDING"
    } else {
        "READY_TO_SHIP"
    };

    let updated_order: OrderEntity = diesel::update(
        orders::table
            .find(id)
            .filter(orders::artisan_id.eq(artisan_id))
            .filter(orders::status.eq("IN_PRODUCTION")),
    )
    .set(orders::status.eq(next_status))
    .returning(OrderEntity::as_returning())
    .get_result(conn)
    .await
    .map_err(|_| AppError::NotFound)?;

    Ok(StdResponse {
        data: Some(updated_order),
        message: Some("Order marked ready successfully"),
    })
}
