//! Bounded-retry wait loop and the single-attempt probe.

use std::future::Future;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::auth;
use crate::wire::{self, AUTH_MORE_DATA_MARKER, AUTH_SWITCH_MARKER, ERR_MARKER, OK_MARKER};
use crate::{DbEndpoint, Error, Result};

// ── Retry policy ─────────────────────────────────────────────────────

/// Bounded retries with a doubling, capped inter-attempt delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempt budget.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Delay cap.
    pub max_delay: Duration,
    /// Per-attempt timeout covering connect + auth + query.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 12,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// Run `attempt` until it succeeds or the budget is exhausted.
///
/// Returns the 1-based attempt number that succeeded. Generic over the
/// attempt so the policy is testable without a live server.
pub async fn wait_with<F, Fut>(policy: &RetryPolicy, mut attempt: F) -> Result<u32>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut delay = policy.initial_delay;
    for n in 1..=policy.max_attempts {
        match attempt(n).await {
            Ok(()) => return Ok(n),
            Err(e) => {
                debug!(attempt = n, max = policy.max_attempts, error = %e, "attempt failed");
                if n < policy.max_attempts {
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, policy.max_delay);
                }
            }
        }
    }
    Err(Error::RetriesExhausted {
        attempts: policy.max_attempts,
    })
}

/// Wait until the database answers an authenticated `SELECT 1`.
pub async fn wait_for_database(endpoint: &DbEndpoint, policy: &RetryPolicy) -> Result<()> {
    info!(address = %endpoint.address(), database = %endpoint.database, "waiting for database");
    let attempts = wait_with(policy, |_| async {
        match tokio::time::timeout(policy.attempt_timeout, probe(endpoint)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(policy.attempt_timeout)),
        }
    })
    .await
    .inspect_err(|_| {
        warn!(address = %endpoint.address(), "database never became reachable");
    })?;
    info!(attempts, "database is ready");
    Ok(())
}

// ── Single attempt ───────────────────────────────────────────────────

/// One probe: connect, authenticate, `SELECT 1`, `COM_QUIT`.
pub async fn probe(endpoint: &DbEndpoint) -> Result<()> {
    let mut stream = TcpStream::connect(endpoint.address()).await?;

    let (_, payload) = wire::read_packet(&mut stream).await?;
    let greeting = wire::parse_greeting(&payload)?;
    debug!(
        server = %greeting.server_version,
        plugin = %greeting.auth_plugin,
        "received server greeting"
    );

    let auth_response = auth::scramble(&greeting.auth_plugin, &endpoint.password, &greeting.nonce)
        .ok_or_else(|| {
            Error::Protocol(format!(
                "unsupported auth plugin {:?}",
                greeting.auth_plugin,
            ))
        })?;
    let response = wire::build_handshake_response(
        &endpoint.user,
        &endpoint.database,
        &greeting.auth_plugin,
        &auth_response,
    );
    wire::write_packet(&mut stream, 1, &response).await?;

    authenticate(&mut stream, endpoint).await?;

    // The authenticated probe query. Any non-ERR reply counts: OK for a
    // server that short-circuits, a column count for a real result set.
    wire::write_packet(&mut stream, 0, &wire::build_query("SELECT 1")).await?;
    let (_, payload) = wire::read_packet(&mut stream).await?;
    if payload.first() == Some(&ERR_MARKER) {
        return Err(wire::parse_err(&payload)?);
    }

    let _ = wire::write_packet(&mut stream, 0, &[wire::COM_QUIT]).await;
    Ok(())
}

/// Drive the post-response auth exchange to an OK packet.
async fn authenticate(stream: &mut TcpStream, endpoint: &DbEndpoint) -> Result<()> {
    loop {
        let (pkt_seq, payload) = wire::read_packet(stream).await?;
        match payload.first() {
            Some(&OK_MARKER) => return Ok(()),
            Some(&ERR_MARKER) => return Err(wire::parse_err(&payload)?),
            Some(&AUTH_SWITCH_MARKER) => {
                let (plugin, nonce) = wire::parse_auth_switch(&payload)?;
                debug!(plugin = %plugin, "auth switch requested");
                let scramble = auth::scramble(&plugin, &endpoint.password, &nonce)
                    .ok_or_else(|| {
                        Error::Protocol(format!("unsupported auth plugin {plugin:?}"))
                    })?;
                wire::write_packet(stream, pkt_seq.wrapping_add(1), &scramble).await?;
            }
            Some(&AUTH_MORE_DATA_MARKER) => match payload.get(1) {
                // caching_sha2 fast-auth success; the OK packet follows.
                Some(&3) => continue,
                // Full auth needs TLS or an RSA exchange; out of scope
                // for a readiness probe.
                Some(&4) => {
                    return Err(Error::Protocol(
                        "server requires full caching_sha2 authentication over an \
                         insecure channel"
                            .into(),
                    ));
                }
                other => {
                    return Err(Error::Protocol(format!(
                        "unexpected auth-more-data status {other:?}",
                    )));
                }
            },
            other => {
                return Err(Error::Protocol(format!(
                    "unexpected auth packet marker {other:?}",
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            attempt_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn succeeds_on_the_nth_attempt_without_extra_tries() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();

        let result = wait_with(&fast_policy(10), |n| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                if n >= 3 {
                    Ok(())
                } else {
                    Err(Error::Protocol("not yet".into()))
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_the_budget_on_a_dead_endpoint() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();

        let result = wait_with(&fast_policy(4), |_| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Protocol("unreachable".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(Error::RetriesExhausted { attempts: 4 })));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn first_attempt_success_uses_one_attempt() {
        let result = wait_with(&fast_policy(1), |_| async { Ok(()) }).await;
        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn probe_fails_fast_against_nothing_listening() {
        let endpoint = DbEndpoint {
            host: "127.0.0.1".into(),
            // Reserved port with nothing bound in the test environment.
            port: 1,
            database: "crm".into(),
            user: "u".into(),
            password: "p".into(),
        };
        assert!(probe(&endpoint).await.is_err());
    }
}
