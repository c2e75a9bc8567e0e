pub mod access_guard;
pub mod memory_store;
pub mod object_store;
pub mod storage_service;
