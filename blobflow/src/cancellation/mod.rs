//! Cooperative cancellation.
//!
//! This module provides:
//! - CancellationToken shared by every layer handling a request
//! - delay, a timer that rejects as soon as the token fires

mod delay;
mod token;

pub use delay::delay;
pub use token::{CancelCallback, CancellationToken};
