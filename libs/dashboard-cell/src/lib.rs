pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use router::{dashboard_routes, report_routes};
pub use services::DashboardService;
