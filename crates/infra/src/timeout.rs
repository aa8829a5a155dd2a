//! Per-call timeouts for async ports.

use std::future::Future;
use std::time::Duration;

use crate::ports::PortError;

/// Await `call`, giving up after `limit` with [`PortError::Timeout`].
pub async fn with_timeout<T, F>(limit: Duration, port: &str, call: F) -> Result<T, PortError>
where
    F: Future<Output = Result<T, PortError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(PortError::Timeout(port.to_string())),
    }
}
