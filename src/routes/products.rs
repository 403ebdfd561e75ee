use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::products::{
        FilterQuery, ProductForm, ProductList, ProductPageQuery, ProductUpload, SearchQuery,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Product,
    response::ApiResponse,
    services::product_service,
    state::AppState,
    uploads,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_product))
        .route("/update_product/{id}", put(update_product))
        .route("/delete_product/{id}", delete(delete_product))
        .route("/get_all_products", get(list_products))
        .route("/get_single_product/{id}", get(get_product))
        .route("/search", get(search_products))
        .route("/pagination", get(paginate_products))
        .route("/filter", get(filter_products))
}

fn parse_number<T: std::str::FromStr>(field: &str, raw: &str) -> AppResult<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| AppError::BadRequest(format!("{field} must be a number")))
}

/// Collect the product multipart form. Unknown fields are ignored.
async fn read_product_form(mut multipart: Multipart) -> AppResult<ProductForm> {
    let mut form = ProductForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "productImage" {
            form.image = Some(uploads::read_image(field).await?);
            continue;
        }
        let text = field
            .text()
            .await
            .map_err(|e| AppError::BadRequest(format!("Invalid field {name}: {e}")))?;
        match name.as_str() {
            "productName" => form.name = Some(text),
            "productPrice" => form.price = Some(parse_number(&name, &text)?),
            "productCategory" => form.category = Some(text),
            "productMaterial" => form.material = Some(text),
            "productDescription" => form.description = Some(text),
            "productQuantity" => form.quantity = Some(parse_number(&name, &text)?),
            _ => {}
        }
    }
    Ok(form)
}

#[utoipa::path(
    post,
    path = "/api/product/create",
    request_body(content = ProductUpload, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Product created", body = ApiResponse<Product>),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Product already exists"),
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<ApiResponse<Product>>)> {
    let form = read_product_form(multipart).await?;
    let resp = product_service::create_product(&state, &user, form).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/product/update_product/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body(content = ProductUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Product updated", body = ApiResponse<Product>),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Product not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<Product>>> {
    let form = read_product_form(multipart).await?;
    let resp = product_service::update_product(&state, &user, id, form).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/product/delete_product/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product deleted"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Product not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = product_service::delete_product(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/product/get_all_products",
    responses(
        (status = 200, description = "All products", body = ApiResponse<ProductList>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    _user: AuthUser,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = product_service::list_products(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/product/get_single_product/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product", body = ApiResponse<Product>),
        (status = 404, description = "Product not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let resp = product_service::get_product(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/product/search",
    params(
        ("q" = Option<String>, Query, description = "Matches name, description or category"),
        ("category" = Option<String>, Query, description = "Exact category, case-insensitive"),
    ),
    responses((status = 200, description = "Matching products", body = ApiResponse<ProductList>)),
    tag = "Products"
)]
pub async fn search_products(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = product_service::search_products(&state, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/product/pagination",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("category" = Option<String>, Query, description = "Category filter"),
        ("material" = Option<String>, Query, description = "Material filter"),
    ),
    responses((status = 200, description = "Nine products per page; meta.total holds the total count", body = ApiResponse<ProductList>)),
    tag = "Products"
)]
pub async fn paginate_products(
    State(state): State<AppState>,
    Query(query): Query<ProductPageQuery>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = product_service::paginate_products(&state, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/product/filter",
    params(
        ("category" = Option<String>, Query, description = "Category filter"),
        ("material" = Option<String>, Query, description = "Material filter"),
        ("min_price" = Option<i64>, Query, description = "Minimum price in paisa"),
        ("max_price" = Option<i64>, Query, description = "Maximum price in paisa"),
        ("sort_by" = Option<String>, Query, description = "created_at, price or name"),
        ("sort_order" = Option<String>, Query, description = "asc or desc"),
    ),
    responses((status = 200, description = "Filtered products", body = ApiResponse<ProductList>)),
    tag = "Products"
)]
pub async fn filter_products(
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = product_service::filter_products(&state, query).await?;
    Ok(Json(resp))
}
