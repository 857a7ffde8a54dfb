pub mod active;
pub mod mirror_config;
pub mod persist;
pub mod session_meta;
