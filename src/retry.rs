//! §9 Design Notes: "a small helper `retry(n, delay, fn)` centralizes the
//! replication-enable and similar loops."

use std::future::Future;
use std::time::Duration;

/// Calls `f` up to `attempts` times. Stops and returns `Ok` as soon as `f`
/// succeeds; sleeps `delay` between attempts. Returns the last error if
/// every attempt fails.
pub async fn retry<T, E, F, Fut>(attempts: u32, delay: Duration, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last_err = None;
    for attempt in 1..=attempts {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    Err(last_err.expect("attempts is always >= 1"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_on_second_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry(5, Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { if n < 2 { Err("not yet") } else { Ok(n) } }
        })
        .await;
        assert_eq!(result, Ok(2));
    }

    #[tokio::test]
    async fn exhausts_attempts_and_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err("nope") }
        })
        .await;
        assert_eq!(result, Err("nope"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
