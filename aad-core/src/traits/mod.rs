//! Core Traits and Abstractions
//!
//! The detector core owns three extension points. Each is a trait so that
//! collaborators can be swapped without touching the feedback loop:
//!
//! - [`ensemble`] - the fitted tree ensemble (`TreeEnsemble`)
//! - [`query`] - strategies that pick the next instance to label (`QueryStrategy`)
//! - [`solver`] - stochastic minimizers for the weight loss (`Objective`, `Solver`)
//!
//! ## Usage Example
//!
//! ```rust
//! use aad_core::tree::{ArrayTree, StaticEnsemble};
//! use aad_core::traits::TreeEnsemble;
//!
//! let trees = vec![ArrayTree::stump(2, 0, 0.5, 30, 2)];
//! let ensemble = StaticEnsemble::new(trees, 32).unwrap();
//! assert_eq!(ensemble.trees().len(), 1);
//! assert!(!ensemble.supports_streaming());
//! ```

pub mod ensemble;
pub mod query;
pub mod solver;

pub use ensemble::TreeEnsemble;
pub use query::{QueryContext, QueryStrategy};
pub use solver::{Objective, Solver};
