//! Failure containment for collaborator calls.
//!
//! Every external strategy call goes through [`contained`] so that one
//! broken, unresponsive, or malformed collaborator degrades to a zero
//! contribution instead of aborting the surrounding operation.

use std::future::Future;

/// Runs a collaborator call, mapping any error to `None`.
///
/// The error is logged at `warn` with the strategy name and operation;
/// nothing retries.
pub async fn contained<T, F>(strategy: &str, op: &str, fut: F) -> Option<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Strategy {} call {} failed: {:#}", strategy, op, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ok_passes_through() {
        let v = contained("s", "op", async { Ok(7u32) }).await;
        assert_eq!(v, Some(7));
    }

    #[tokio::test]
    async fn err_degrades_to_none() {
        let v: Option<u32> =
            contained("s", "op", async { anyhow::bail!("strategy reverted") }).await;
        assert_eq!(v, None);
    }
}
