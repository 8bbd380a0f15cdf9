//! Printer endpoints
//!
//! Supports:
//! - Device / port printers (`COM1`, `/dev/usb/lp0`, `/dev/ttyUSB0`)
//! - Network printers (raw TCP, port 9100 by default)
//!
//! Endpoints only know how to push an already staged buffer to the
//! hardware. Deadlines, serialization and buffer cleanup belong to the
//! [`DeliveryTransport`](crate::DeliveryTransport).

use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{info, instrument, warn};

use crate::error::{PrintError, PrintResult};

/// Trait for printer endpoints
#[async_trait]
pub trait Printer: Send + Sync {
    /// Identity of the endpoint; jobs with the same identity never overlap
    fn endpoint(&self) -> &str;

    /// Send a staged buffer to the printer
    async fn transmit(&self, staged: &Path) -> PrintResult<()>;

    /// Check if the printer is online/reachable
    async fn is_online(&self) -> bool;
}

/// Endpoint for a configured port name
///
/// IP addresses (with or without a port) reach a network printer, anything
/// else is treated as a device path or port name.
pub fn open_endpoint(name: &str) -> PrintResult<Arc<dyn Printer>> {
    if let Ok(printer) = NetworkPrinter::parse(name) {
        return Ok(Arc::new(printer));
    }
    Ok(Arc::new(DevicePrinter::new(name)?))
}

/// Printer reached through a device path or serial/parallel port name
///
/// The staged buffer is copied onto the device, the same way `type file >
/// COM1` or `cat file > /dev/usb/lp0` would do it.
#[derive(Debug, Clone)]
pub struct DevicePrinter {
    name: String,
    path: PathBuf,
}

impl DevicePrinter {
    pub fn new(name: &str) -> PrintResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PrintError::InvalidConfig("empty device name".to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            path: device_path(name),
        })
    }

    /// Resolved path written to
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Bare `COMn` / `LPTn` names need the device namespace on Windows
#[cfg(windows)]
fn device_path(name: &str) -> PathBuf {
    let upper = name.to_ascii_uppercase();
    let is_port = ["COM", "LPT"].iter().any(|p| {
        upper
            .strip_prefix(p)
            .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
    });
    if is_port {
        PathBuf::from(format!(r"\\.\{}", name))
    } else {
        PathBuf::from(name)
    }
}

#[cfg(not(windows))]
fn device_path(name: &str) -> PathBuf {
    PathBuf::from(name)
}

fn open_device(path: &Path) -> std::io::Result<std::fs::File> {
    let mut options = std::fs::OpenOptions::new();
    #[cfg(windows)]
    options.write(true);
    #[cfg(not(windows))]
    options.append(true);
    options.open(path)
}

#[async_trait]
impl Printer for DevicePrinter {
    fn endpoint(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, staged), fields(device = %self.name))]
    async fn transmit(&self, staged: &Path) -> PrintResult<()> {
        let source = staged.to_path_buf();
        let device = self.path.clone();

        let copied = tokio::task::spawn_blocking(move || -> std::io::Result<u64> {
            let mut input = std::fs::File::open(&source)?;
            let mut output = open_device(&device)?;
            let n = std::io::copy(&mut input, &mut output)?;
            output.flush()?;
            Ok(n)
        })
        .await
        .map_err(|e| PrintError::Io(std::io::Error::other(format!("Task join failed: {}", e))))?
        .map_err(|source| PrintError::Transmission {
            endpoint: self.name.clone(),
            source,
        })?;

        info!(bytes = copied, "Data written to device");
        Ok(())
    }

    async fn is_online(&self) -> bool {
        let device = self.path.clone();
        match tokio::task::spawn_blocking(move || open_device(&device)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!(device = %self.name, error = %e, "Printer offline");
                false
            }
            Err(_) => false,
        }
    }
}

/// Raw print port spoken by network thermal printers
pub const RAW_PRINT_PORT: u16 = 9100;

/// How long a print connection may take to open
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// How long a reachability check waits
const ONLINE_CHECK_TIMEOUT: Duration = Duration::from_millis(500);

/// Printer reached over raw TCP
#[derive(Debug, Clone)]
pub struct NetworkPrinter {
    addr: SocketAddr,
    endpoint: String,
    connect_timeout: Duration,
}

impl NetworkPrinter {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            endpoint: addr.to_string(),
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    /// Parse `ip` or `ip:port`; a bare IP uses [`RAW_PRINT_PORT`]
    pub fn parse(target: &str) -> PrintResult<Self> {
        let target = target.trim();
        target
            .parse::<SocketAddr>()
            .or_else(|_| {
                target
                    .parse::<IpAddr>()
                    .map(|ip| SocketAddr::new(ip, RAW_PRINT_PORT))
            })
            .map(Self::new)
            .map_err(|_| PrintError::InvalidConfig(format!("Invalid printer address: {}", target)))
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.addr
    }

    async fn connect(&self, limit: Duration) -> PrintResult<TcpStream> {
        match tokio::time::timeout(limit, TcpStream::connect(self.addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(PrintError::Connection(format!("{}: {}", self.addr, e))),
            Err(_) => Err(PrintError::Connection(format!(
                "{}: no answer within {:?}",
                self.addr, limit
            ))),
        }
    }
}

#[async_trait]
impl Printer for NetworkPrinter {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[instrument(skip(self, staged), fields(addr = %self.addr))]
    async fn transmit(&self, staged: &Path) -> PrintResult<()> {
        let data = tokio::fs::read(staged).await?;
        let mut stream = self.connect(self.connect_timeout).await?;

        let failed = |source: std::io::Error| PrintError::Transmission {
            endpoint: self.endpoint.clone(),
            source,
        };
        stream.write_all(&data).await.map_err(failed)?;
        stream.flush().await.map_err(failed)?;

        info!(bytes = data.len(), "Data written to socket");
        Ok(())
    }

    async fn is_online(&self) -> bool {
        match self.connect(ONLINE_CHECK_TIMEOUT).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Printer offline");
                false
            }
        }
    }
}
