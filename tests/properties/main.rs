//! Property tests for vector math, ranking and fusion.

mod determinism_tests;
mod ranking_tests;
