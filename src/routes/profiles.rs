use anyhow::{Context, Result};
use axum::{Extension, Json, extract::State, response::IntoResponse};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        middleware::{self, SessionClaims},
    },
    models::{UpdateUserEntity, UpsertUserEntity, UserEntity},
    schema::users,
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/profiles",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(sync_profile))
            .routes(utoipa_axum::routes!(get_my_profile))
            .routes(utoipa_axum::routes!(update_my_profile))
            .route_layer(axum::middleware::from_fn(middleware::users_authorization)),
    )
}

#[derive(Deserialize, ToSchema)]
struct SyncProfileReq {
    display_name: Option<String>,
}

/// Mirror the authenticated identity into the users table. Called by the
/// client right after login; later logins refresh email and role.
#[utoipa::path(
    post,
    path = "/sync",
    tags = ["Profiles"],
    security(("bearerAuth" = [])),
    request_body = SyncProfileReq,
    responses(
        (status = 200, description = "Profile synced", body = StdResponse<UserEntity, String>)
    )
)]
async fn sync_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Json(body): Json<SyncProfileReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user: UserEntity = diesel::insert_into(users::table)
        .values(UpsertUserEntity {
            id: claims.sub,
            email: claims.email.clone(),
            display_name: body.display_name.clone(),
            role: claims.role.clone(),
        })
        .on_conflict(users::id)
        .do_update()
        .set((
            users::email.eq(claims.email),
            users::display_name.eq(body.display_name),
            users::role.eq(claims.role),
        ))
        .returning(UserEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to sync profile")?;

    Ok(StdResponse {
        data: Some(user),
        message: Some("Profile synced successfully"),
    })
}

/// Fetch the authenticated user's profile.
#[utoipa::path(
    get,
    path = "/me",
    tags = ["Profiles"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Get profile successfully", body = StdResponse<UserEntity, String>)
    )
)]
async fn get_my_profile(
    State(state): State<AppState>,
    Extension(user_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user: UserEntity = users::table
        .find(user_id)
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;

    Ok(StdResponse {
        data: Some(user),
        message: Some("Get profile successfully"),
    })
}

/// Update the caller's zone and/or pickup address.
#[utoipa::path(
    patch,
    path = "/me",
    tags = ["Profiles"],
    security(("bearerAuth" = [])),
    request_body = UpdateUserEntity,
    responses(
        (status = 200, description = "Profile updated", body = StdResponse<UserEntity, String>)
    )
)]
async fn update_my_profile(
    State(state): State<AppState>,
    Extension(user_id): Extension<i32>,
    Json(body): Json<UpdateUserEntity>,
) -> Result<impl IntoResponse, AppError> {
    if body.zone.is_none() && body.pickup_address.is_none() {
        return Err(AppError::BadRequest("Nothing to update".to_string()));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user: UserEntity = diesel::update(users::table.find(user_id))
        .set(body)
        .returning(UserEntity::as_returning())
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;

    Ok(StdResponse {
        data: Some(user),
        message: Some("Profile updated successfully"),
    })
}
