//! # Warren Support
//!
//! Shared utilities for the Warren container crates.
//!
//! This crate provides:
//! - Text rendering for error messages and scope trees

pub mod rendering;
