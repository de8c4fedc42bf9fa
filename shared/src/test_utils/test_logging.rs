use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes env_logger once per test binary; safe to call from every test.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}
