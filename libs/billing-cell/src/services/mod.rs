pub mod invoice;

pub use invoice::{InvoiceFilters, InvoiceService};
