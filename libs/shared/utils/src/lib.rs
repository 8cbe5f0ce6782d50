pub mod extractor;
pub mod fields;
pub mod jwt;
pub mod password;
pub mod state;
pub mod test_utils;
pub mod timestamp;
pub mod validation;

pub use extractor::{auth_middleware, role_guard, AppJson, AppPath, AppQuery, RoleGuard};
pub use fields::{rename_fields_and_timestamps, to_wire, with_display_time};
pub use state::AppState;
