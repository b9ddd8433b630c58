//! Upload pipeline services.
//!
//! `SessionBuffer` and `RepositoryAllocator` are the leaves;
//! `UploadCoordinator` sequences them with the remote `ObjectStore` and the
//! `RecordStore`.

pub mod object_store;
pub mod record_store;
pub mod repository_allocator;
pub mod session_buffer;
pub mod upload_coordinator;
