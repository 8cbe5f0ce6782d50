pub mod bootstrap;
pub mod user;

pub use user::UserService;
