use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, PgTextExpressionMethods, QueryDsl, QueryResult};
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use utoipa::IntoParams;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        aliases::DieselError,
        app_error::{AppError, StdResponse},
        app_state::AppState,
    },
    models::{CategoryEntity, ProductEntity},
    schema::{categories, products},
};

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_categories))
        .routes(utoipa_axum::routes!(get_products))
        .routes(utoipa_axum::routes!(get_product))
}

/// Fetch all product categories.
#[utoipa::path(
    get,
    path = "/categories",
    tags = ["Catalog"],
    responses(
        (status = 200, description = "List categories", body = StdResponse<Vec<CategoryEntity>, String>)
    )
)]
async fn get_categories(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let categories: Vec<CategoryEntity> = categories::table
        .order_by(categories::name.asc())
        .get_results(conn)
        .await
        .context("Failed to get categories")?;

    Ok(StdResponse {
        data: Some(categories),
        message: Some("Get categories successfully"),
    })
}

#[derive(Deserialize, IntoParams)]
struct ProductFilter {
    category_id: Option<i32>,
    q: Option<String>,
}

/// Fetch storefront products, optionally narrowed by category or search term.
#[utoipa::path(
    get,
    path = "/products",
    tags = ["Catalog"],
    params(ProductFilter),
    responses(
        (status = 200, description = "List products", body = StdResponse<Vec<ProductEntity>, String>)
    )
)]
async fn get_products(
    Query(filter): Query<ProductFilter>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let mut query = products::table.into_boxed();
    if let Some(category_id) = filter.category_id {
        query = query.filter(products::category_id.eq(category_id));
    }
    if let Some(q) = filter.q.filter(|q| !q.trim().is_empty()) {
        query = query.filter(products::name.ilike(format!("%{}%", q.trim())));
    }

    let products: Vec<ProductEntity> = query
        .order_by(products::name.asc())
        .get_results(conn)
        .await
        .context("Failed to get products")?;

    Ok(StdResponse {
        data: Some(products),
        message: Some("Get products successfully"),
    })
}

/// Fetch a single product.
#[utoipa::path(
    get,
    path = "/products/{id}",
    tags = ["Catalog"],
    params(
        ("id" = i32, Path, description = "Product ID to fetch")
    ),
    responses(
        (status = 200, description = "Get product successfully", body = StdResponse<ProductEntity, String>)
    )
)]
async fn get_product(
    Path(id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product: QueryResult<ProductEntity> = products::table.find(id).get_result(conn).await;

    match product {
        Ok(product) => Ok(StdResponse {
            data: Some(product),
            message: Some("Get product successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}
