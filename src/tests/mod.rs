//! Scenario tests for listlru.
//!
//! This module contains multi-threaded and property-based tests that drive
//! several lists, cgroups and walkers at once.

mod cases_property_test;

pub mod support;
