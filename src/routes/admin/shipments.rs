use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        config,
        middleware::{self},
    },
    models::{OrderEntity, OrderItemEntity, UserEntity},
    schema::{order_items, orders, users},
    shipping,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/admin/orders",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(create_shipment))
            .route_layer(axum::middleware::from_fn(middleware::admins_authorization)),
    )
}

/// Hand the order to the courier: resolve a pickup location, create the
/// shipment, then try to get a waybill. A waybill failure does not undo the
/// shipment; the order still goes out as `SHIPPED` with empty tracking
/// fields and the console backfills them later.
#[utoipa::path(
    post,
    path = "/{id}/shipment",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Order ID to ship")
    ),
    responses(
        (status = 200, description = "Shipment created", body = StdResponse<OrderEntity, String>),
        (status = 400, description = "Order is not shippable"),
        (status = 422, description = "Courier rejected the shipment payload")
    )
)]
async fn create_shipment(
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

    if matches!(order.status.as_str(), "SHIPPED" | "DELIVERED") {
        return Err(AppError::Conflict(format!(
            "Order #{id} has already been shipped"
        )));
    }
    if matches!(order.status.as_str(), "PAYMENT_PENDING" | "CANCELLED") {
        return Err(AppError::BadRequest(format!(
            "Order #{id} is not shippable while {}",
            order.status
        )));
    }

    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq(order.id))
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    let pickup_location = if order.order_type == "custom" {
        resolve_artisan_pickup(&state, &order).await?
    } else {
        resolve_default_pickup(&state).await?
    };

    let request = shipping::build_shipment_request(&order, &items, &pickup_location)
        .map_err(AppError::BadRequest)?;

    let created = state.shiprocket.create_order(&request).await?;

    // The shipment already exists on the courier side at this point, so a
    // waybill failure must not fail the request.
    let awb = match state.shiprocket.assign_awb(created.shipment_id).await {
        Ok(awb) => Some(awb),
        Err(err) => {
            tracing::warn!("Waybill assignment for order #{id} failed: {err}");
            None
        }
    };

    let updated_order: OrderEntity = diesel::update(orders::table.find(order.id))
        .set((
            orders::status.eq("SHIPPED"),
            orders::courier_order_id.eq(Some(created.order_id.to_string())),
            orders::shipment_id.eq(Some(created.shipment_id.to_string())),
            orders::awb_code.eq(awb.as_ref().map(|awb| awb.awb_code.clone())),
            orders::courier_name.eq(awb.as_ref().map(|awb| awb.courier_name.clone())),
        ))
        .returning(OrderEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to record shipment")?;

    Ok(StdResponse {
        data: Some(updated_order),
        message: Some("Shipment created successfully"),
    })
}

/// Custom orders ship from the assigned artisan's address, registered with
/// the courier under a code derived from the artisan's email. The pickup
/// address is validated before any courier call is made.
async fn resolve_artisan_pickup(state: &AppState, order: &OrderEntity) -> Result<String, AppError> {
    let artisan_id = order.artisan_id.ok_or_else(|| {
        AppError::BadRequest(format!("Order #{} has no artisan assigned", order.id))
    })?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;
    let artisan: UserEntity = users::table
        .find(artisan_id)
        .get_result(conn)
        .await
        .map_err(|_| AppError::BadRequest(format!("Artisan {artisan_id} no longer exists")))?;

    let address = shipping::parse_pickup_address(artisan.pickup_address.as_ref())
        .map_err(AppError::BadRequest)?;

    let code = shipping::pickup_code_for_email(&artisan.email);
    let locations = state.shiprocket.get_pickup_locations().await?;

    if !locations
        .iter()
        .any(|location| location.pickup_location == code)
    {
        let request = shipping::pickup_location_request(&code, &artisan.email, &address);
        state.shiprocket.add_pickup_location(&request).await?;
        tracing::info!("Registered pickup location {code} for artisan {artisan_id}");
    }

    Ok(code)
}

/// Standard orders ship from the warehouse: the location whose nickname
/// matches the configured default, or failing that whatever is registered
/// first.
async fn resolve_default_pickup(state: &AppState) -> Result<String, AppError> {
    let default_name = config::var_or("SHIPROCKET_DEFAULT_PICKUP", "Primary");
    let locations = state.shiprocket.get_pickup_locations().await?;

    locations
        .iter()
        .find(|location| location.pickup_location == default_name)
        .or_else(|| <[_]>::first(&locations))
        .map(|location| location.pickup_location.clone())
        .ok_or_else(|| {
            AppError::BadRequest("No pickup locations are registered with the courier".to_string())
        })
}
