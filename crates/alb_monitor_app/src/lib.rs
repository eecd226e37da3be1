//! Command-line front end for the ALB monitor stacks.
//!
//! Commands are plain functions over `alb_monitor_core`; AWS access sits
//! behind the traits in `adapters` so the binary alone owns SDK clients.

pub mod adapters;
pub mod commands;
