//! Listen address parsing and socket setup
//!
//! Accepted forms:
//!
//! | Spec | Meaning |
//! |------|---------|
//! | `8080`, `:8080` | all interfaces on that port (IPv4 only if IPv6 is unavailable) |
//! | `127.0.0.1:8080`, `[::1]:8080` | that address |
//! | `envfd:NAME` | adopt the open socket whose fd is in `$<PREFIX>_NAME` |

use crate::error::{ProxyError, ProxyResult};
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener};
use std::str::FromStr;
use tracing::debug;

/// Default prefix for inherited listener variables
pub const DEFAULT_FD_ENV_PREFIX: &str = "RUNSIT_PORTFD";

const ENVFD_SCHEME: &str = "envfd:";

/// Where to accept connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenSpec {
    Port(u16),
    Addr(SocketAddr),
    EnvFd(String),
}

impl FromStr for ListenSpec {
    type Err = ProxyError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ProxyError::ListenSpec {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        if let Some(name) = spec.strip_prefix(ENVFD_SCHEME) {
            if name.is_empty() {
                return Err(invalid("missing descriptor name"));
            }
            return Ok(Self::EnvFd(name.to_string()));
        }

        let port = spec.strip_prefix(':').unwrap_or(spec);
        if !port.contains(':') {
            return port
                .parse()
                .map(Self::Port)
                .map_err(|_| invalid("not a port number"));
        }
        spec.parse()
            .map(Self::Addr)
            .map_err(|_| invalid("not an ip:port pair"))
    }
}

impl fmt::Display for ListenSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Port(port) => write!(f, ":{}", port),
            Self::Addr(addr) => write!(f, "{}", addr),
            Self::EnvFd(name) => write!(f, "{}{}", ENVFD_SCHEME, name),
        }
    }
}

impl ListenSpec {
    /// Bind (or adopt) the listening socket
    pub fn bind(&self, fd_env_prefix: &str) -> ProxyResult<tokio::net::TcpListener> {
        let listener = match self {
            Self::Port(port) => bind_any(*port)?,
            Self::Addr(addr) => bind_addr(*addr)?,
            Self::EnvFd(name) => {
                let fd = inherited_fd(name, fd_env_prefix, |var| std::env::var(var).ok())?;
                adopt_fd(fd)?
            }
        };
        listener
            .set_nonblocking(true)
            .map_err(|e| ProxyError::io("configuring listener", e))?;
        tokio::net::TcpListener::from_std(listener)
            .map_err(|e| ProxyError::io("registering listener", e))
    }
}

/// All interfaces: IPv6 (dual-stack where the host allows), else IPv4
fn bind_any(port: u16) -> ProxyResult<TcpListener> {
    match TcpListener::bind(SocketAddr::from((Ipv6Addr::UNSPECIFIED, port))) {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => Err(ProxyError::Bind {
            addr: format!(":{}", port),
            source: e,
        }),
        Err(e) => {
            debug!("IPv6 unavailable ({}), listening on IPv4 only", e);
            bind_addr(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        }
    }
}

fn bind_addr(addr: SocketAddr) -> ProxyResult<TcpListener> {
    TcpListener::bind(addr).map_err(|source| ProxyError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Look up the descriptor number for `name` via `lookup`
pub fn inherited_fd(
    name: &str,
    prefix: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> ProxyResult<i32> {
    let var = format!("{}_{}", prefix, name);
    let value = lookup(&var).filter(|v| !v.is_empty()).ok_or_else(|| {
        ProxyError::ListenFdMissing {
            name: name.to_string(),
            var: var.clone(),
        }
    })?;
    match value.trim().parse::<i32>() {
        Ok(fd) if fd >= 0 => Ok(fd),
        _ => Err(ProxyError::ListenFdInvalid { var, value }),
    }
}

#[cfg(unix)]
fn adopt_fd(fd: i32) -> ProxyResult<TcpListener> {
    use std::os::fd::FromRawFd;

    // SAFETY: the supervisor hands this descriptor to us as an open listening
    // socket and nothing else in the process owns it.
    let listener = unsafe { TcpListener::from_raw_fd(fd) };
    listener
        .local_addr()
        .map_err(|e| ProxyError::io(format!("inherited descriptor {} is not a socket", fd), e))?;
    Ok(listener)
}

#[cfg(not(unix))]
fn adopt_fd(fd: i32) -> ProxyResult<TcpListener> {
    Err(ProxyError::ListenSpec {
        spec: format!("{}{}", ENVFD_SCHEME, fd),
        reason: "inherited descriptors are only supported on unix".to_string(),
    })
}
