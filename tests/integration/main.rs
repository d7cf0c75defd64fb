//! Integration tests for the index, fusion and search pipeline.

mod index_tests;
mod persistence_tests;
mod scenario_tests;
