#![allow(dead_code)]

pub use watchrun_test_utils::{init_tracing, with_timeout};
