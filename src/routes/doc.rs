use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        cart::{AddToCartRequest, CartStatusUpdated, CartView, UpdateCartStatusRequest},
        khalti::{
            CompletePaymentQuery, InitializePaymentRequest, InitializedPayment,
            KhaltiConfigStatus, PaymentOutcome,
        },
        logs::ActivityLogList,
        orders::{OrderList, OrderWithItems, PlaceOrderRequest, UpdateOrderStatusRequest},
        products::{ProductList, ProductUpload},
        reviews::{AverageRating, PostReviewRequest, ReviewList, UpdateReviewRequest},
        users::{
            Acknowledgement, EmailRequest, LoginRequest, LoginResponse, PasswordHistoryRequest,
            PasswordHistorySummary, ProfilePictureUpload, RegisterRequest, ResetPasswordRequest,
            TokenResponse, UpdateProfileRequest, VerifyOtpRequest,
        },
        wishlist::{WishlistRequest, WishlistView},
    },
    entity::{
        cart_items::CartStatus,
        orders::{OrderStatus, PaymentMethod, PaymentStatus},
    },
    models::{ActivityLog, CartItem, Order, OrderItem, Product, Review, User},
    response::{ApiResponse, Meta},
    routes::{
        cart, health, khalti, logs, orders, params, products, reviews, users, wishlist,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "SparkleNest API", description = "Cosmetics and jewelry storefront backend"),
    paths(
        health::health_check,
        health::test_endpoint,
        health::debug_info,
        health::rate_limit_status,
        users::register,
        users::verify_register_otp,
        users::login,
        users::verify_login_otp,
        users::resend_login_otp,
        users::refresh_token,
        users::current_user,
        users::forgot_password,
        users::reset_password,
        users::upload_profile_picture,
        users::update_profile,
        users::password_history,
        products::create_product,
        products::update_product,
        products::delete_product,
        products::list_products,
        products::get_product,
        products::search_products,
        products::paginate_products,
        products::filter_products,
        cart::add_to_cart,
        cart::get_cart,
        cart::remove_from_cart,
        cart::update_status,
        wishlist::add_to_wishlist,
        wishlist::get_wishlist,
        wishlist::remove_from_wishlist,
        reviews::post_review,
        reviews::get_reviews,
        reviews::get_review_by_user_and_product,
        reviews::average_rating,
        reviews::update_review,
        orders::place_order,
        orders::get_orders_by_user,
        orders::get_single_order,
        orders::get_all_orders,
        orders::update_order_status,
        khalti::initialize_khalti,
        khalti::complete_khalti_payment,
        khalti::test_khalti,
        logs::activity_logs
    ),
    components(
        schemas(
            User,
            Product,
            CartItem,
            Review,
            Order,
            OrderItem,
            ActivityLog,
            CartStatus,
            OrderStatus,
            PaymentMethod,
            PaymentStatus,
            RegisterRequest,
            VerifyOtpRequest,
            LoginRequest,
            LoginResponse,
            EmailRequest,
            ResetPasswordRequest,
            UpdateProfileRequest,
            PasswordHistoryRequest,
            PasswordHistorySummary,
            ProfilePictureUpload,
            TokenResponse,
            Acknowledgement,
            ProductUpload,
            ProductList,
            AddToCartRequest,
            CartView,
            UpdateCartStatusRequest,
            CartStatusUpdated,
            WishlistRequest,
            WishlistView,
            PostReviewRequest,
            UpdateReviewRequest,
            ReviewList,
            AverageRating,
            PlaceOrderRequest,
            UpdateOrderStatusRequest,
            OrderWithItems,
            OrderList,
            InitializePaymentRequest,
            InitializedPayment,
            CompletePaymentQuery,
            PaymentOutcome,
            KhaltiConfigStatus,
            ActivityLogList,
            health::HealthData,
            health::DebugData,
            health::RateLimitStatus,
            params::Pagination,
            params::SortOrder,
            params::ProductSortBy,
            params::OrderListQuery,
            Meta,
            ApiResponse<User>,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<CartView>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health and status endpoints"),
        (name = "User", description = "Accounts, login, OTP and profile"),
        (name = "Products", description = "Catalog endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Wishlist", description = "Wishlist endpoints"),
        (name = "Reviews", description = "Product review endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Khalti", description = "Khalti payment endpoints"),
        (name = "Logs", description = "Activity log endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
