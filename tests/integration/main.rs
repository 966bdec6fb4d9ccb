//! Integration tests

mod common;
mod daemon_tests;
mod state_tests;
