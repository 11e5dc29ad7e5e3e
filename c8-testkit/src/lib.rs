//! Test helpers for C8 client tests.
//!
//! Provides stub-backed fabrics, job polling, and document fixtures.

mod helpers;

pub use helpers::{student, wait_until_done, TestFabric, POLL_INTERVAL, TEST_FABRIC, TEST_TENANT};
