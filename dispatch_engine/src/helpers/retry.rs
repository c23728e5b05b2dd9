use std::{fmt::Display, future::Future, time::Duration};

use log::*;

/// Calls `f` up to `attempts` times, sleeping `backoff × attempt` between failures (2s, 4s, … for a 2s backoff).
/// The last error is returned if every attempt fails.
pub async fn retry_with_linear_backoff<T, E, F, Fut>(
    label: &str,
    attempts: u32,
    backoff: Duration,
    mut f: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match f(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < attempts => {
                warn!("{label} failed on attempt {attempt} of {attempts}. {e}");
                tokio::time::sleep(backoff * attempt).await;
                attempt += 1;
            },
            Err(e) => {
                warn!("{label} failed on the final attempt ({attempt}). {e}");
                return Err(e);
            },
        }
    }
}
