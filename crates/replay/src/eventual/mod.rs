//! Eventual descriptors and composition
//!
//! This module provides:
//! - [`Eventual`] - closed set of awaitable operation kinds
//! - [`CombinatorMode`] - all / all-settled / any / race evaluation
//! - [`Dependency`] - wiring used by combinators and deadlines

mod combinator;
mod descriptor;

pub use combinator::CombinatorMode;
pub use descriptor::{Dependency, DependencyHandler, Eventual, EventApplication, Resolution};
