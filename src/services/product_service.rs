use chrono::Utc;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::sea_query::{Expr, Func, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    dto::products::{FilterQuery, ProductForm, ProductList, ProductPageQuery, SearchQuery},
    entity::products::{ActiveModel, Column, Entity as Products},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::{Pagination, ProductSortBy, SortOrder},
    state::AppState,
    uploads,
};

pub const PRODUCTS_PER_PAGE: i64 = 9;
pub const MAX_DESCRIPTION_CHARS: usize = 1000;

fn required_text(field: &str, value: Option<String>) -> AppResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("{field} is required")))
}

fn check_description(description: &str) -> AppResult<()> {
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(AppError::BadRequest(format!(
            "Description must be at most {MAX_DESCRIPTION_CHARS} characters"
        )));
    }
    Ok(())
}

fn check_price(price: i64) -> AppResult<()> {
    if price < 0 {
        return Err(AppError::BadRequest("Price must not be negative".into()));
    }
    Ok(())
}

fn check_quantity(quantity: i32) -> AppResult<()> {
    if quantity < 0 {
        return Err(AppError::BadRequest("Quantity must not be negative".into()));
    }
    Ok(())
}

async fn ensure_name_free(state: &AppState, name: &str, except: Option<Uuid>) -> AppResult<()> {
    let mut finder = Products::find().filter(Column::Name.eq(name));
    if let Some(id) = except {
        finder = finder.filter(Column::Id.ne(id));
    }
    if finder.count(&state.orm).await? > 0 {
        return Err(AppError::Conflict("Product already exists".into()));
    }
    Ok(())
}

/// `LOWER(column) = LOWER(value)`; `%` and `_` in the value are literal.
fn equals_ignoring_case(column: Column, value: &str) -> SimpleExpr {
    Expr::expr(Func::lower(Expr::col(column))).eq(Func::lower(Expr::val(value)))
}

/// Escapes `ILIKE` wildcards so `term` only ever matches itself.
fn like_escape(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Case-insensitive exact matches on category and material.
fn catalog_condition(category: Option<&str>, material: Option<&str>) -> Condition {
    let mut condition = Condition::all();
    if let Some(category) = category.map(str::trim).filter(|s| !s.is_empty()) {
        condition = condition.add(equals_ignoring_case(Column::Category, category));
    }
    if let Some(material) = material.map(str::trim).filter(|s| !s.is_empty()) {
        condition = condition.add(equals_ignoring_case(Column::Material, material));
    }
    condition
}

fn to_list(models: Vec<crate::entity::products::Model>) -> ProductList {
    ProductList {
        products: models.into_iter().map(Product::from).collect(),
    }
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    form: ProductForm,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let name = required_text("productName", form.name)?;
    let category = required_text("productCategory", form.category)?;
    let description = required_text("productDescription", form.description)?;
    let price = form
        .price
        .ok_or_else(|| AppError::BadRequest("productPrice is required".into()))?;
    let quantity = form
        .quantity
        .ok_or_else(|| AppError::BadRequest("productQuantity is required".into()))?;
    let image = form
        .image
        .ok_or_else(|| AppError::BadRequest("productImage is required".into()))?;
    check_price(price)?;
    check_quantity(quantity)?;
    check_description(&description)?;
    ensure_name_free(state, &name, None).await?;

    let stored = uploads::save_image(&state.config.products_dir(), &image).await?;
    let now = Utc::now();
    let product = ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        price: Set(price),
        category: Set(category),
        material: Set(form.material.map(|m| m.trim().to_string()).filter(|m| !m.is_empty())),
        description: Set(description),
        image: Set(stored),
        quantity: Set(quantity),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;

    tracing::info!(product_id = %product.id, admin = %user.user_id, "product created");
    Ok(ApiResponse::success(
        "Product created successfully",
        product.into(),
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    form: ProductForm,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let existing = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    let old_image = existing.image.clone();
    let old_name = existing.name.clone();

    let mut active: ActiveModel = existing.into();
    if let Some(name) = form.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
        if name != old_name {
            ensure_name_free(state, &name, Some(id)).await?;
        }
        active.name = Set(name);
    }
    if let Some(price) = form.price {
        check_price(price)?;
        active.price = Set(price);
    }
    if let Some(category) = form.category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()) {
        active.category = Set(category);
    }
    if let Some(material) = form.material {
        let material = material.trim().to_string();
        active.material = Set((!material.is_empty()).then_some(material));
    }
    if let Some(description) = form.description {
        check_description(&description)?;
        active.description = Set(description);
    }
    if let Some(quantity) = form.quantity {
        check_quantity(quantity)?;
        active.quantity = Set(quantity);
    }

    let dir = state.config.products_dir();
    let replaced = match form.image {
        Some(image) => {
            active.image = Set(uploads::save_image(&dir, &image).await?);
            true
        }
        None => false,
    };
    active.updated_at = Set(Utc::now().into());
    let product = active.update(&state.orm).await?;

    if replaced {
        uploads::remove_file(&dir, &old_image).await;
    }

    tracing::info!(product_id = %product.id, admin = %user.user_id, "product updated");
    Ok(ApiResponse::success(
        "Product updated successfully",
        product.into(),
        Some(Meta::empty()),
    ))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let existing = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let result = Products::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }
    uploads::remove_file(&state.config.products_dir(), &existing.image).await;

    tracing::info!(product_id = %id, admin = %user.user_id, "product deleted");
    Ok(ApiResponse::success(
        "Product deleted successfully",
        serde_json::json!({ "id": id }),
        Some(Meta::empty()),
    ))
}

pub async fn list_products(state: &AppState) -> AppResult<ApiResponse<ProductList>> {
    let products = Products::find()
        .order_by_desc(Column::CreatedAt)
        .all(&state.orm)
        .await?;
    let meta = Meta::listing(products.len());
    Ok(ApiResponse::success(
        "Products fetched successfully",
        to_list(products),
        Some(meta),
    ))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Product>> {
    let product = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("Product fetched successfully", product.into(), None))
}

pub async fn search_products(
    state: &AppState,
    query: SearchQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let mut condition = catalog_condition(query.category.as_deref(), None);
    if let Some(term) = query.q.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", like_escape(term));
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern.clone()))
                .add(Expr::col(Column::Category).ilike(pattern)),
        );
    }

    let products = Products::find()
        .filter(condition)
        .order_by_asc(Column::Name)
        .all(&state.orm)
        .await?;
    let meta = Meta::listing(products.len());
    Ok(ApiResponse::success(
        "Search results",
        to_list(products),
        Some(meta),
    ))
}

pub async fn paginate_products(
    state: &AppState,
    query: ProductPageQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, per_page, offset) = Pagination {
        page: query.page,
        per_page: None,
    }
    .normalize_with(PRODUCTS_PER_PAGE);

    let finder = Products::find()
        .filter(catalog_condition(
            query.category.as_deref(),
            query.material.as_deref(),
        ))
        .order_by_desc(Column::CreatedAt);
    let total = finder.clone().count(&state.orm).await? as i64;
    let products = finder
        .limit(per_page as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    Ok(ApiResponse::success(
        "Products fetched successfully",
        to_list(products),
        Some(Meta::new(page, per_page, total)),
    ))
}

pub async fn filter_products(
    state: &AppState,
    query: FilterQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let mut condition = catalog_condition(query.category.as_deref(), query.material.as_deref());
    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }
    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    let sort_col = match query.sort_by.unwrap_or(ProductSortBy::CreatedAt) {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
    };
    let mut finder = Products::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let products = finder.all(&state.orm).await?;
    let meta = Meta::listing(products.len());
    Ok(ApiResponse::success(
        "Filtered products",
        to_list(products),
        Some(meta),
    ))
}

#[cfg(test)]
mod tests {
    use sea_orm::{DbBackend, QueryTrait};

    use super::*;

    fn rendered(condition: Condition) -> String {
        Products::find()
            .filter(condition)
            .build(DbBackend::Postgres)
            .to_string()
    }

    #[test]
    fn catalog_filters_compare_whole_values() {
        let sql = rendered(catalog_condition(Some(" Ring_% "), Some("Gold")));
        assert!(sql.contains(r#"LOWER("category") = LOWER('Ring_%')"#), "{sql}");
        assert!(sql.contains(r#"LOWER("material") = LOWER('Gold')"#), "{sql}");
        assert!(!sql.contains("ILIKE"), "{sql}");
    }

    #[test]
    fn blank_filters_are_ignored() {
        assert!(catalog_condition(Some("  "), None).is_empty());
    }

    #[test]
    fn search_terms_escape_wildcards() {
        assert_eq!(like_escape("50%_off"), r"50\%\_off");
        assert_eq!(like_escape(r"a\b"), r"a\\b");
        assert_eq!(like_escape("necklace"), "necklace");
    }
}
