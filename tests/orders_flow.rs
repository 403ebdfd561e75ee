mod common;

use sparklenest_api::{
    dto::{
        cart::AddToCartRequest,
        orders::{PlaceOrderRequest, UpdateOrderStatusRequest},
        reviews::PostReviewRequest,
        wishlist::WishlistRequest,
    },
    entity::orders::{OrderStatus, PaymentMethod, PaymentStatus},
    error::AppError,
    services::{cart_service, order_service, review_service, wishlist_service},
};

// Shopper fills a cart, orders, the admin cancels and stock comes back; the
// shopper then reviews the product once.
#[tokio::test]
async fn cart_order_cancel_and_review_flow() -> anyhow::Result<()> {
    let Some(state) = common::database_state(common::test_config()).await? else {
        return Ok(());
    };

    let shopper = common::create_user(&state, "user").await?;
    let admin = common::create_user(&state, "admin").await?;
    let product = common::create_product(&state, 250_000, 5).await?;

    // Adding twice merges into one active line.
    cart_service::add_to_cart(
        &state,
        &shopper,
        AddToCartRequest {
            product_id: product.id,
            quantity: 1,
        },
    )
    .await?;
    cart_service::add_to_cart(
        &state,
        &shopper,
        AddToCartRequest {
            product_id: product.id,
            quantity: 2,
        },
    )
    .await?;
    let cart = cart_service::get_cart(&state, &shopper).await?.data.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.total, 750_000);

    let too_many = cart_service::add_to_cart(
        &state,
        &shopper,
        AddToCartRequest {
            product_id: product.id,
            quantity: 10,
        },
    )
    .await;
    assert!(matches!(too_many, Err(AppError::BadRequest(_))));

    let placed = order_service::place_order(
        &state,
        &shopper,
        PlaceOrderRequest {
            street: "Lakeside Road".into(),
            city: "Pokhara".into(),
            phone: "9800000001".into(),
            payment_method: PaymentMethod::CashOnDelivery,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(placed.order.total_price, 750_000);
    assert_eq!(placed.order.status, OrderStatus::Pending);
    assert_eq!(placed.order.payment_status, PaymentStatus::Unpaid);
    assert_eq!(placed.items.len(), 1);
    assert_eq!(common::stock_of(&state, product.id).await?, 2);

    let cart = cart_service::get_cart(&state, &shopper).await?.data.unwrap();
    assert!(cart.items.is_empty());

    // Another shopper cannot see the order.
    let stranger = common::create_user(&state, "user").await?;
    let hidden = order_service::get_single_order(&state, &stranger, placed.order.id).await;
    assert!(matches!(hidden, Err(AppError::NotFound)));

    let forbidden = order_service::update_order_status(
        &state,
        &shopper,
        placed.order.id,
        UpdateOrderStatusRequest {
            status: "Cancelled".into(),
        },
    )
    .await;
    assert!(matches!(forbidden, Err(AppError::Forbidden(_))));

    let cancelled = order_service::update_order_status(
        &state,
        &admin,
        placed.order.id,
        UpdateOrderStatusRequest {
            status: "cancelled".into(),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert_eq!(common::stock_of(&state, product.id).await?, 5);

    let reopened = order_service::update_order_status(
        &state,
        &admin,
        placed.order.id,
        UpdateOrderStatusRequest {
            status: "Pending".into(),
        },
    )
    .await;
    assert!(matches!(reopened, Err(AppError::BadRequest(_))));

    // Wishlist adds are idempotent.
    for _ in 0..2 {
        wishlist_service::add_to_wishlist(
            &state,
            &shopper,
            WishlistRequest {
                product_id: product.id,
            },
        )
        .await?;
    }
    let wishlist = wishlist_service::get_wishlist(&state, &shopper).await?.data.unwrap();
    assert_eq!(wishlist.products.len(), 1);

    review_service::post_review(
        &state,
        &shopper,
        PostReviewRequest {
            product_id: product.id,
            rating: 4,
            review: "Lovely shine".into(),
        },
    )
    .await?;
    let duplicate = review_service::post_review(
        &state,
        &shopper,
        PostReviewRequest {
            product_id: product.id,
            rating: 5,
            review: "Again".into(),
        },
    )
    .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    review_service::post_review(
        &state,
        &stranger,
        PostReviewRequest {
            product_id: product.id,
            rating: 5,
            review: "Great gift".into(),
        },
    )
    .await?;
    let average = review_service::average_rating(&state, product.id)
        .await?
        .data
        .unwrap();
    assert_eq!(average.count, 2);
    assert!((average.average - 4.5).abs() < f64::EPSILON);

    Ok(())
}
