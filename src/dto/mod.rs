pub mod cart;
pub mod khalti;
pub mod logs;
pub mod orders;
pub mod products;
pub mod reviews;
pub mod users;
pub mod wishlist;
