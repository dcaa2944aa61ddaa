use anyhow::{Context, Result};
use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        middleware::{self},
    },
    models::ChatEntity,
    schema::chats,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/admin/chats",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(set_hijack))
            .route_layer(axum::middleware::from_fn(middleware::admins_authorization)),
    )
}

#[derive(Deserialize, ToSchema)]
struct SetHijackReq {
    hijacked: bool,
}

/// Take over (or hand back) a conversation. While hijacked, the assigned
/// artisan cannot post; support answers in their place.
#[utoipa::path(
    patch,
    path = "/{id}/hijack",
    tags = ["Admin"],
    security(("bearerAuth" = [])),
    params(
        ("id" = String, Path, description = "Chat thread to toggle")
    ),
    request_body = SetHijackReq,
    responses(
        (status = 200, description = "Hijack flag updated", body = StdResponse<ChatEntity, String>)
    )
)]
async fn set_hijack(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<SetHijackReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let updated_chat: ChatEntity = diesel::update(chats::table.find(id))
        .set(chats::hijacked.eq(body.hijacked))
        .returning(ChatEntity::as_returning())
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;

    Ok(StdResponse {
        data: Some(updated_chat),
        message: Some("Hijack flag updated successfully"),
    })
}
