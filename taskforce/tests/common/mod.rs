#![allow(dead_code)]

use std::time::{Duration, Instant};

use taskforce::{Runtime, RuntimeConfig};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn runtime(workers: u16) -> Runtime {
    init_logging();
    Runtime::create(RuntimeConfig::default().num_workers(workers)).expect("runtime")
}

/// Poll `check` until it holds, failing the test after two seconds.
pub async fn eventually<F: FnMut() -> bool>(mut check: F) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
