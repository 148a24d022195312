//! NBA timeout treatment/control dataset builder.
//!
//! Joins a season of play-by-play events with schedule and team metadata,
//! derives point-differential trajectories, and assembles a treatment/control
//! table (timeouts vs sampled non-timeouts) for downstream analysis.

pub mod config;
pub mod data;
pub mod stages;
pub mod timeline;
