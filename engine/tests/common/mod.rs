//! Fixtures and helpers shared by the engine's integration suites

#![allow(dead_code)]

pub mod fixtures;
pub mod helpers;

pub use fixtures::TestFixtures;
pub use helpers::{GatedPersistence, Harness, TestHelpers};
