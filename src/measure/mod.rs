//! Sample smoothing and running statistics.
//!
//! Link delay measurements are passed through a [`Filter`] before being
//! published; clock adjustment and link delay samples are accumulated in
//! [`Stats`] for periodic reporting.

mod filter;
mod stats;


pub use filter::{Filter, FilterKind};
pub use stats::{Stats, StatsSummary};
