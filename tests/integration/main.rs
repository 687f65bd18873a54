//! Integration tests for momentum-radar

mod backtest_test;
mod broadcast_test;
mod config_test;
mod scoring_test;
mod support;
mod worker_test;
