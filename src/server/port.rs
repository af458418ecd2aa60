use thiserror::Error;
use tokio::net::TcpListener;

pub const DEFAULT_START_PORT: u16 = 14096;
pub const DEFAULT_MAX_ATTEMPTS: u16 = 100;

#[derive(Debug, Error)]
#[error("no free port found in range {start}-{end}")]
pub struct NoFreePort {
    pub start: u16,
    pub end: u16,
}

/// Probe ports sequentially from `start_port`, returning the first one a
/// loopback listener can bind.
pub async fn find_free_port(start_port: u16, max_attempts: u16) -> Result<u16, NoFreePort> {
    for attempt in 0..max_attempts {
        let Some(port) = start_port.checked_add(attempt) else {
            break;
        };
        if is_port_available(port).await {
            return Ok(port);
        }
    }
    Err(NoFreePort {
        start: start_port,
        end: start_port.saturating_add(max_attempts.saturating_sub(1)),
    })
}

/// A port counts as available only when we can bind it on loopback. Bind
/// errors other than address-in-use also report unavailable.
pub async fn is_port_available(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn skips_a_bound_port() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let taken = listener.local_addr().unwrap().port();

        let found = find_free_port(taken, 10).await.unwrap();
        assert!(found > taken);
        assert!(is_port_available(found).await);
        drop(listener);
    }

    #[tokio::test]
    async fn reports_range_when_exhausted() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let taken = listener.local_addr().unwrap().port();

        let err = find_free_port(taken, 1).await.unwrap_err();
        assert_eq!(err.start, taken);
        assert_eq!(err.end, taken);
        drop(listener);
    }

    #[tokio::test]
    async fn free_port_is_returned_directly() {
        let probe = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        assert_eq!(find_free_port(port, 5).await.unwrap(), port);
    }
}
