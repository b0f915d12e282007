pub mod domain;
pub mod repository;
mod rows;

pub use domain::{validate_url, ValidationError, WishFields};
pub use repository::{DynWishRepository, SqliteWishRepository, WishRepository};

pub(crate) use rows::{query_wishes, WISH_COLUMNS};
