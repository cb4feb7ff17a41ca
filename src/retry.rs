//! The outer retry loop the core deliberately does not perform itself.
//!
//! The Dispatcher returns [`crate::DispatchError::Retry`] and leaves
//! scheduling — including backoff — to its caller. `with_backoff` is the
//! straightforward loop most callers want, shipped here so every embedding
//! application doesn't reinvent (and potentially diverge from) it.

use std::thread;
use std::time::Duration;

use crate::error::DispatchError;

/// Call `f` up to `attempts` times. Retries only on
/// `Err(DispatchError::Retry)`, sleeping for an exponentially increasing
/// duration (starting at `initial`, capped at `max`) between attempts. Any
/// other error, or a success, returns immediately.
pub fn with_backoff<T>(
    attempts: u32,
    initial: Duration,
    max: Duration,
    mut f: impl FnMut() -> Result<T, DispatchError>,
) -> Result<T, DispatchError> {
    let attempts = attempts.max(1);
    let mut delay = initial;

    for attempt in 0..attempts {
        match f() {
            Ok(value) => return Ok(value),
            Err(DispatchError::Retry) if attempt + 1 < attempts => {
                thread::sleep(delay);
                delay = delay.saturating_mul(2).min(max);
            }
            Err(err) => return Err(err),
        }
    }

    Err(DispatchError::Retry)
}
