//! Synthesis of the ALB monitor CloudFormation stacks.
//!
//! This crate owns the resource graph, deployment parameters, context
//! validation and the controller environment contract. It intentionally
//! excludes AWS SDK and CLI concerns; those live in `alb_monitor_app`.

pub mod app;
pub mod assets;
pub mod context;
pub mod controller;
pub mod error;
pub mod parameters;
pub mod stacks;
pub mod template;

pub use error::SynthError;
