pub mod blob_service;
pub mod media_type;
pub mod task_service;
