use anyhow::{Context, Result};
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{BoolExpressionMethods, ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        app_error::{AppError, StdResponse},
        app_state::AppState,
        middleware::{self, ROLE_ADMIN, ROLE_ARTISAN, SessionClaims},
    },
    models::{ChatEntity, ChatMessageEntity, CreateChatEntity, CreateChatMessageEntity},
    schema::{chat_messages, chats},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new().nest(
        "/chats",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(open_chat))
            .routes(utoipa_axum::routes!(get_my_chats))
            .routes(utoipa_axum::routes!(get_messages))
            .routes(utoipa_axum::routes!(post_message))
            .route_layer(axum::middleware::from_fn(middleware::users_authorization)),
    )
}

/// Thread keys are synthesized from the participants and the product under
/// discussion, so reopening the same conversation lands on the same thread.
pub(crate) fn chat_key(customer_id: i32, artisan_id: Option<i32>, product_id: Option<i32>) -> String {
    match (artisan_id, product_id) {
        (Some(artisan), Some(product)) => format!("custom_{customer_id}_{artisan}_{product}"),
        (Some(artisan), None) => format!("custom_{customer_id}_{artisan}"),
        (None, Some(product)) => format!("inquiry_{customer_id}_{product}"),
        (None, None) => format!("support_{customer_id}"),
    }
}

#[derive(Deserialize, ToSchema)]
struct OpenChatReq {
    /// Required when an artisan opens the thread.
    customer_id: Option<i32>,
    artisan_id: Option<i32>,
    product_id: Option<i32>,
    order_id: Option<i32>,
}

/// Open (or return) the thread for this participant pair. Threads are
/// created lazily on first open.
#[utoipa::path(
    post,
    path = "/open",
    tags = ["Chats"],
    security(("bearerAuth" = [])),
    request_body = OpenChatReq,
    responses(
        (status = 200, description = "Chat opened", body = StdResponse<ChatEntity, String>)
    )
)]
async fn open_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Json(body): Json<OpenChatReq>,
) -> Result<impl IntoResponse, AppError> {
    let (customer_id, artisan_id) = if claims.role == ROLE_ARTISAN {
        let customer_id = body.customer_id.ok_or_else(|| {
            AppError::BadRequest("customer_id is required when an artisan opens a chat".to_string())
        })?;
        (customer_id, Some(claims.sub))
    } else {
        (claims.sub, body.artisan_id)
    };

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let id = chat_key(customer_id, artisan_id, body.product_id);

    diesel::insert_into(chats::table)
        .values(CreateChatEntity {
            id: id.clone(),
            customer_id,
            artisan_id,
            product_id: body.product_id,
            order_id: body.order_id,
        })
        .on_conflict_do_nothing()
        .execute(conn)
        .await
        .context("Failed to open chat")?;

    let chat: ChatEntity = chats::table
        .find(id)
        .get_result(conn)
        .await
        .context("Failed to load chat")?;

    Ok(StdResponse {
        data: Some(chat),
        message: Some("Chat opened successfully"),
    })
}

/// Threads the caller participates in, most recently active first.
#[utoipa::path(
    get,
    path = "/my",
    tags = ["Chats"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List my chats", body = StdResponse<Vec<ChatEntity>, String>)
    )
)]
async fn get_my_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let my_chats: Vec<ChatEntity> = chats::table
        .filter(
            chats::customer_id
                .eq(claims.sub)
                .or(chats::artisan_id.eq(claims.sub)),
        )
        .order_by(chats::updated_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get chats")?;

    Ok(StdResponse {
        data: Some(my_chats),
        message: Some("Get my chats successfully"),
    })
}

/// Fetch a thread's messages in server write order.
#[utoipa::path(
    get,
    path = "/{id}/messages",
    tags = ["Chats"],
    security(("bearerAuth" = [])),
    params(
        ("id" = String, Path, description = "Chat thread to read")
    ),
    responses(
        (status = 200, description = "List messages", body = StdResponse<Vec<ChatMessageEntity>, String>)
    )
)]
async fn get_messages(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let chat: ChatEntity = chats::table
        .find(id)
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;
    ensure_participant(&chat, &claims)?;

    let messages: Vec<ChatMessageEntity> = chat_messages::table
        .filter(chat_messages::chat_id.eq(&chat.id))
        .order_by(chat_messages::id.asc())
        .get_results(conn)
        .await
        .context("Failed to get messages")?;

    Ok(StdResponse {
        data: Some(messages),
        message: Some("Get messages successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct PostMessageReq {
    kind: String,
    body: Option<String>,
    media_url: Option<String>,
}

/// Append a message to the thread. Hijacked threads reject posts from the
/// assigned artisan; the customer keeps talking to support without knowing
/// the difference.
#[utoipa::path(
    post,
    path = "/{id}/messages",
    tags = ["Chats"],
    security(("bearerAuth" = [])),
    params(
        ("id" = String, Path, description = "Chat thread to post to")
    ),
    request_body = PostMessageReq,
    responses(
        (status = 200, description = "Message posted", body = StdResponse<ChatMessageEntity, String>),
        (status = 403, description = "Thread is hijacked for this artisan")
    )
)]
async fn post_message(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Json(body): Json<PostMessageReq>,
) -> Result<impl IntoResponse, AppError> {
    match body.kind.as_str() {
        "text" => {
            if body.body.as_deref().unwrap_or("").trim().is_empty() {
                return Err(AppError::BadRequest(
                    "Text messages need a body".to_string(),
                ));
            }
        }
        "image" | "audio" => {
            if body.media_url.as_deref().unwrap_or("").trim().is_empty() {
                return Err(AppError::BadRequest(format!(
                    "{} messages need a media_url",
                    body.kind
                )));
            }
        }
        other => {
            return Err(AppError::BadRequest(format!(
                "{other} is not a valid message kind"
            )));
        }
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let chat: ChatEntity = chats::table
        .find(id)
        .get_result(conn)
        .await
        .map_err(|_| AppError::NotFound)?;
    ensure_participant(&chat, &claims)?;

    if chat.hijacked && claims.role == ROLE_ARTISAN && chat.artisan_id == Some(claims.sub) {
        return Err(AppError::ForbiddenResource(
            "This conversation has been taken over by support".to_string(),
        ));
    }

    let message: ChatMessageEntity = diesel::insert_into(chat_messages::table)
        .values(CreateChatMessageEntity {
            chat_id: chat.id.clone(),
            sender_id: claims.sub,
            sender_role: claims.role.clone(),
            kind: body.kind,
            body: body.body,
            media_url: body.media_url,
        })
        .returning(ChatMessageEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to post message")?;

    diesel::update(chats::table.find(&chat.id))
        .set(chats::updated_at.eq(diesel::dsl::now))
        .execute(conn)
        .await
        .context("Failed to touch chat")?;

    Ok(StdResponse {
        data: Some(message),
        message: Some("Message posted successfully"),
    })
}

fn ensure_participant(chat: &ChatEntity, claims: &SessionClaims) -> Result<(), AppError> {
    let is_participant = chat.customer_id == claims.sub
        || chat.artisan_id == Some(claims.sub)
        || claims.role == ROLE_ADMIN;

    if is_participant {
        Ok(())
    } else {
        Err(AppError::ForbiddenResource(
            "You are not part of this conversation".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_keys_are_stable_per_participants_and_product() {
        assert_eq!(chat_key(12, Some(7), Some(88)), "custom_12_7_88");
        assert_eq!(chat_key(12, Some(7), None), "custom_12_7");
        assert_eq!(chat_key(12, None, Some(88)), "inquiry_12_88");
        assert_eq!(chat_key(12, None, None), "support_12");
    }

    fn chat(customer_id: i32, artisan_id: Option<i32>) -> ChatEntity {
        ChatEntity {
            id: chat_key(customer_id, artisan_id, None),
            customer_id,
            artisan_id,
            product_id: None,
            order_id: None,
            hijacked: false,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn claims(sub: i32, role: &str) -> SessionClaims {
        SessionClaims {
            sub,
            email: "someone@costerbox.in".to_string(),
            role: role.to_string(),
            exp: 0,
        }
    }

    #[test]
    fn participants_and_admins_can_read() {
        let chat = chat(12, Some(7));
        assert!(ensure_participant(&chat, &claims(12, "customer")).is_ok());
        assert!(ensure_participant(&chat, &claims(7, "artisan")).is_ok());
        assert!(ensure_participant(&chat, &claims(99, "admin")).is_ok());
    }

    #[test]
    fn outsiders_cannot_read() {
        let chat = chat(12, Some(7));
        assert!(ensure_participant(&chat, &claims(13, "customer")).is_err());
        assert!(ensure_participant(&chat, &claims(8, "artisan")).is_err());
    }
}
