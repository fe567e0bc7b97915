//! Test Helper Utilities
//!
//! Shared fixtures for the upc-process integration tests

#![allow(dead_code)]

pub mod db_utils;
pub mod fake_toolkit;

pub use db_utils::{count, create_test_env, TestEnv};
pub use fake_toolkit::{BandFixture, FakeToolkit};
