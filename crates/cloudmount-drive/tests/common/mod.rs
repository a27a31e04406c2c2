//! Common test utilities for drive integration tests.

#![allow(dead_code)]

pub mod assertions;
pub mod harness;

pub use assertions::*;
pub use harness::{CREATOR_PID, STRANGER_PID, SYSTEM_PID, TestDrive};
