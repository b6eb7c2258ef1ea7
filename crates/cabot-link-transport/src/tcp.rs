use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Result, TransportError};

/// Robot socket addresses, tried in rotation on every reconnect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressCandidates {
    addrs: Vec<String>,
    next: usize,
}

impl AddressCandidates {
    pub fn new<I, S>(addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addrs: addrs
                .into_iter()
                .map(Into::into)
                .filter(|addr: &String| !addr.trim().is_empty())
                .collect(),
            next: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    /// The address to try next; advances the rotation.
    pub fn next_addr(&mut self) -> Option<&str> {
        if self.addrs.is_empty() {
            return None;
        }
        let idx = self.next % self.addrs.len();
        self.next = (idx + 1) % self.addrs.len();
        Some(self.addrs[idx].as_str())
    }
}

/// Connect to `addr` (`host:port`) within `timeout`.
pub async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => {
            return Err(TransportError::Connect {
                addr: addr.to_string(),
                source,
            })
        }
        Err(_) => {
            return Err(TransportError::ConnectTimeout {
                addr: addr.to_string(),
                timeout,
            })
        }
    };
    stream.set_nodelay(true)?;
    debug!(addr, "connected to robot socket");
    Ok(stream)
}
