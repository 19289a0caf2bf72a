pub mod config;
pub mod context;
pub mod errors;
pub mod metrics_consts;
pub mod orders;
pub mod sequence;
pub mod shops;
pub mod store;

// Shared with the integration tests under tests/
pub mod test_utils;
