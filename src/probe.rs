//! Outbound connectivity probe.
//!
//! A real-internet check, not a local-network one: attempts a short TCP
//! connection to a well-known external address and reports a boolean. The
//! grounding selector uses it to decide whether reference text is even worth
//! fetching, and the status endpoint surfaces it to clients.

use std::time::Duration;
use tokio::net::TcpStream;

/// Returns `true` if the probe target is reachable within the timeout.
///
/// Any failure (timeout, DNS, refusal) collapses to `false`; this never
/// errors and never retries. The connection is dropped immediately.
pub async fn is_online(target: &str, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(target)).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_target_is_offline() {
        // TEST-NET-1 address, guaranteed unroutable
        let online = is_online("192.0.2.1:9", Duration::from_millis(200)).await;
        assert!(!online);
    }

    #[tokio::test]
    async fn reachable_target_is_online() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let online = is_online(&addr.to_string(), Duration::from_secs(1)).await;
        assert!(online);
    }

    #[tokio::test]
    async fn malformed_target_is_offline() {
        let online = is_online("not an address", Duration::from_millis(200)).await;
        assert!(!online);
    }
}
