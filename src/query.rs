//! Query compilation.
//!
//! ```text
//! Filter + FindOptions ──FindOptimizer──> FindPlan ──> stream pipeline
//! ```

pub mod filter;
pub mod options;
pub mod plan;
pub mod planner;
