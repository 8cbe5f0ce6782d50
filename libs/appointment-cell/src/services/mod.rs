pub mod booking;
pub mod conflict;

pub use booking::{AppointmentFilters, AppointmentService};
