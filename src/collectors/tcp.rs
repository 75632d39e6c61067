use crate::error::{ProbeError, ProbeOutcome};
use crate::state::LatencyStat;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::{lookup_host, TcpStream};
use tokio::time;
use tracing::{debug, warn};

/// Runs `attempts` sequential connects to `host:port`, each bounded by `timeout`.
///
/// Refused or timed-out connects are counted as failed attempts. Only name
/// resolution and local socket errors fail the probe as a whole.
pub async fn ping(
    host: &str,
    port: u16,
    timeout: Duration,
    attempts: u32,
) -> ProbeOutcome<LatencyStat> {
    let addr = resolve(host, port).await?;

    let mut passed = 0_u32;
    let mut total_ms = 0.0_f64;
    for attempt in 1..=attempts {
        let start = Instant::now();
        match time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                let elapsed = start.elapsed();
                drop(stream);
                passed += 1;
                total_ms += elapsed.as_secs_f64() * 1000.0;
                debug!(address = %addr, attempt, latency = ?elapsed, "tcp attempt succeeded");
            }
            Ok(Err(err)) if is_local_error(&err) => {
                warn!(address = %addr, error = %err, "tcp socket error");
                return Err(ProbeError::transport(format!("{addr}: {err}")));
            }
            Ok(Err(err)) => {
                debug!(address = %addr, attempt, error = %err, "tcp attempt failed");
            }
            Err(_elapsed) => {
                debug!(address = %addr, attempt, "tcp attempt timeout");
            }
        }
    }

    let average_ms = (passed > 0).then(|| total_ms / f64::from(passed));
    Ok(LatencyStat {
        average_ms,
        passed,
        failed: attempts - passed,
    })
}

async fn resolve(host: &str, port: u16) -> ProbeOutcome<SocketAddr> {
    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|err| {
            warn!(host, error = %err, "name resolution failed");
            ProbeError::transport(format!("cannot resolve {host}: {err}"))
        })?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| ProbeError::transport(format!("no address found for {host}")))
}

fn is_local_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::Unsupported
            | io::ErrorKind::OutOfMemory
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn counts_every_accepted_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let _server = tokio::spawn(async move {
            while let Ok((_stream, _addr)) = listener.accept().await {}
        });

        let stat = ping("127.0.0.1", port, Duration::from_secs(1), 5)
            .await
            .expect("probe runs");
        assert_eq!(stat.passed, 5);
        assert_eq!(stat.failed, 0);
        assert!(stat.average_ms.is_some());
    }

    #[tokio::test]
    async fn closed_port_counts_failures_without_average() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);

        let stat = ping("127.0.0.1", port, Duration::from_secs(1), 20)
            .await
            .expect("refused connects are counted, not fatal");
        assert_eq!(stat.passed, 0);
        assert_eq!(stat.failed, 20);
        assert_eq!(stat.average_ms, None);
        assert_eq!(stat.failed_percent(), 100);
    }

    #[tokio::test]
    async fn unresolvable_host_fails_the_probe() {
        let err = ping("no-such-host.invalid", 443, Duration::from_millis(200), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Transport(_)), "{err:?}");
    }
}
