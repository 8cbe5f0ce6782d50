pub mod auth;
pub mod error;
pub mod response;

pub use auth::{Claims, CurrentUser, Role};
pub use error::{AppError, FieldError};
pub use response::{ApiResponse, PageQuery, Paginated, Pagination};
