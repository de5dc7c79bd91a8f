//! stackcalc: Per-Client Stack Calculator
//!
//! An in-memory registry of independent integer stacks, one per client key,
//! with aggregate operators (`min`, `max`, `gcd`, `lcm`) that collapse a
//! whole stack into a single value.
//!
//! The registry is transport-agnostic. It is owned by whatever serves it
//! (see the `stackcalc-grpc` crate) and shared by reference or `Arc`.
//!
//! # Concurrency
//!
//! Every stack sits behind its own mutex, and the key table is a sharded
//! concurrent map. Operations on one client are linearizable; operations on
//! different clients never wait on each other.
//!
//! ```
//! use stackcalc::{Operator, StackRegistry};
//!
//! let registry = StackRegistry::new();
//! registry.push_value("x", 10);
//! registry.push_value("x", 20);
//! registry.apply("x", Operator::Max).unwrap();
//! assert_eq!(registry.pop("x").unwrap(), 20);
//! assert!(registry.is_empty("x"));
//! ```

mod error;
mod operator;
mod registry;

pub use error::CalcError;
pub use operator::Operator;
pub use registry::StackRegistry;

/// Re-exported so callers of [`StackRegistry::delay_pop`] don't need a direct
/// `tokio-util` dependency.
pub use tokio_util::sync::CancellationToken;
