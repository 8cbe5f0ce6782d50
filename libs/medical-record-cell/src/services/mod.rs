pub mod record;
pub mod storage;

pub use record::{MedicalRecordService, RecordFilters};
pub use storage::{decode_upload, AttachmentStore, DecodedUpload, LocalDiskStore};
