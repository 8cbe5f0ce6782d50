pub mod patient;

pub use patient::{PatientFilters, PatientService};
