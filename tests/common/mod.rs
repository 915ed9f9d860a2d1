#![allow(unused_imports)]

pub use converge_test_utils::builders;
pub use converge_test_utils::fakes;
pub use converge_test_utils::{init_tracing, with_timeout};
