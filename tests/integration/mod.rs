//! Integration test suite for soldeploy
//!
//! End-to-end tests of sequencing, templatization round trips, deployment
//! against the recording mock catalog, and the command line.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **sequencing**: deployment order and cycle detection over whole bundles
//! - **templating**: idempotence, round trips and word-boundary safety
//! - **deploy**: full deployments with the mock catalog
//! - **cli**: the `soldeploy` binary

mod cli;
mod deploy;
mod sequencing;
mod templating;
