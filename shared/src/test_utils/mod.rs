//! In-memory fakes and helpers for driving the services in tests.

pub mod http_test_utils;
pub mod mock_stores;
pub mod test_logging;
