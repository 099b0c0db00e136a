//! `healthwatch`: a periodic, fan-out HTTP health-check engine.
//!
//! Probes a configured population of endpoints on independent schedules,
//! classifies each outcome into a four-valued status lattice, appends an
//! RFC 4180 history record, and republishes a JSON snapshot consumed by an
//! external static-site build. See `DESIGN.md` for the grounding ledger.

pub mod cli;
pub mod config;
pub mod core;
pub mod logging;
