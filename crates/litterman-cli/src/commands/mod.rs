pub mod black_litterman;
pub mod estimation;
pub mod optimize;
pub mod pipeline;
pub mod schedule;
pub mod universe;

use std::time::Instant;

/// Microseconds since `start`, saturating.
pub(crate) fn elapsed_us(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX)
}
