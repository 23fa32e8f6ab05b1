// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OctoDash core: types, push-event payloads, and error definitions shared
// across all crates.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::DashboardConfig;
pub use error::OctodashError;
pub use types::*;
