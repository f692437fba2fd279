//! # zonewatch-server
//!
//! HTTP server library for the zonewatch geofencing system.
//!
//! This library provides the API handlers, logging setup and state management
//! for zonewatch.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
