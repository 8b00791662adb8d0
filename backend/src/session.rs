// UDP ping session bound to one Mumble endpoint.
// Invariants: every await is raced against the cycle's cancellation token; payloads are never logged.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{lookup_host, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use ping_core::codec::{decode_probe_response, encode_probe_request, DecodeError};
use ping_core::model::ProbeResponse;

use crate::constants::PROBE_RECV_BUFFER;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("connect cancelled")]
    Cancelled,
    #[error("failed to bind to {endpoint}: {source}")]
    Network {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe cancelled")]
    Cancelled,
    #[error("ping transport failed: {0}")]
    Network(#[from] io::Error),
    #[error(transparent)]
    Malformed(#[from] DecodeError),
}

/// A connected datagram socket. Clones share the same socket.
#[derive(Clone, Debug)]
pub struct Session {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl Session {
    pub async fn open(endpoint: &Endpoint, cancel: &CancellationToken) -> Result<Self, ConnectError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ConnectError::Cancelled),
            opened = connect(endpoint) => opened.map_err(|source| ConnectError::Network {
                endpoint: endpoint.clone(),
                source,
            }),
        }
    }

    pub async fn probe(&self, cancel: &CancellationToken) -> Result<ProbeResponse, ProbeError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProbeError::Cancelled),
            result = self.exchange() => result,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn same_socket(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.socket, &other.socket)
    }

    async fn exchange(&self) -> Result<ProbeResponse, ProbeError> {
        let mut buf = [0u8; PROBE_RECV_BUFFER];
        // Anything already queued answers an earlier request.
        while let Ok(len) = self.socket.try_recv(&mut buf) {
            debug!(len, peer = %self.peer, "discarding stale datagram");
        }
        self.socket.send(&encode_probe_request()).await?;
        let len = self.socket.recv(&mut buf).await?;
        Ok(decode_probe_response(&buf[..len])?)
    }
}

async fn connect(endpoint: &Endpoint) -> io::Result<Session> {
    let peer = lookup_host((endpoint.host.as_str(), endpoint.port))
        .await?
        .next()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} did not resolve to any address", endpoint.host),
            )
        })?;
    let bind_ip = match peer {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    let socket = UdpSocket::bind(SocketAddr::new(bind_ip, 0)).await?;
    socket.connect(peer).await?;
    debug!(%endpoint, %peer, local_addr = %socket.local_addr()?, "ping session opened");
    Ok(Session {
        socket: Arc::new(socket),
        peer,
    })
}
