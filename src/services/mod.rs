pub mod activity_service;
pub mod cart_service;
pub mod order_service;
pub mod payment_service;
pub mod product_service;
pub mod review_service;
pub mod user_service;
pub mod wishlist_service;
