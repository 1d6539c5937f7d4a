//! Utilities for collecting and reporting telemetry data.

pub mod histogram;
