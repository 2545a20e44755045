// tests/integration_test.rs

//! Integration tests that drive the orchestrator end-to-end, exercising
//! the full pipeline rather than one module in isolation.

mod integration {
    pub mod alerts_test;
    pub mod pipeline_test;
    pub mod stats_test;
    pub mod test_helpers;
}
