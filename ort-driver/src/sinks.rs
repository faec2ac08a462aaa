//! Output sink implementations
//!
//! Sinks forward output records to various destinations (stdout, file, UDP)
//! as NDJSON or MessagePack.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, warn};

/// One engine output as it leaves the driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub session: String,
    pub step: u64,
    pub t: f64,
    pub captured_at: DateTime<Utc>,
    /// Output fields kept by the field mask, keyed by wire name
    pub output: serde_json::Value,
}

/// Wire encoding of output records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Concatenated MessagePack maps
    Msgpack,
}

impl OutputFormat {
    /// Encode a record, newline-terminated for JSON
    pub fn encode(&self, record: &OutputRecord) -> Result<Vec<u8>> {
        match self {
            Self::Json => {
                let mut bytes = serde_json::to_vec(record)?;
                bytes.push(b'\n');
                Ok(bytes)
            }
            Self::Msgpack => Ok(rmp_serde::to_vec_named(record)?),
        }
    }
}

/// Where records go
#[derive(Debug, Clone, PartialEq)]
pub enum SinkSpec {
    Stdout,
    File { path: PathBuf },
    Udp { host: String, port: u16 },
}

impl FromStr for SinkSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "stdout" || s == "-" {
            return Ok(Self::Stdout);
        }
        if let Some(path) = s.strip_prefix("file:") {
            if path.is_empty() {
                bail!("file sink needs a path (file:<path>)");
            }
            return Ok(Self::File {
                path: PathBuf::from(path),
            });
        }
        if let Some(addr) = s.strip_prefix("udp:") {
            let Some((host, port)) = addr.rsplit_once(':') else {
                bail!("udp sink needs host and port (udp:<host>:<port>)");
            };
            let port: u16 = port
                .parse()
                .with_context(|| format!("invalid udp port '{port}'"))?;
            if host.is_empty() {
                bail!("udp sink needs a host (udp:<host>:<port>)");
            }
            return Ok(Self::Udp {
                host: host.to_string(),
                port,
            });
        }
        bail!("unknown sink '{s}' (expected stdout, file:<path> or udp:<host>:<port>)")
    }
}

impl fmt::Display for SinkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::File { path } => write!(f, "file:{}", path.display()),
            Self::Udp { host, port } => write!(f, "udp:{host}:{port}"),
        }
    }
}

/// Trait for output sinks
pub trait Sink: Send {
    fn send(&mut self, record: &OutputRecord) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Standard output sink
pub struct StdoutSink {
    format: OutputFormat,
    out: std::io::Stdout,
}

impl StdoutSink {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            out: std::io::stdout(),
        }
    }
}

impl Sink for StdoutSink {
    fn send(&mut self, record: &OutputRecord) -> Result<()> {
        let bytes = self.format.encode(record)?;
        self.out.lock().write_all(&bytes)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.lock().flush()?;
        Ok(())
    }
}

/// UDP sink, one datagram per record
///
/// A full socket buffer drops the record instead of closing the sink.
pub struct UdpSink {
    socket: UdpSocket,
    addr: SocketAddr,
    format: OutputFormat,
    dropped: u64,
}

impl UdpSink {
    pub fn new(host: &str, port: u16, format: OutputFormat) -> Result<Self> {
        let addr = (host, port)
            .to_socket_addrs()
            .with_context(|| format!("failed to resolve {host}:{port}"))?
            .next()
            .with_context(|| format!("no address for {host}:{port}"))?;
        let bind: SocketAddr = if addr.is_ipv4() {
            "0.0.0.0:0".parse()?
        } else {
            "[::]:0".parse()?
        };
        let socket = UdpSocket::bind(bind)?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            addr,
            format,
            dropped: 0,
        })
    }

    /// Records dropped because the socket would have blocked
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn settle(&mut self, sent: std::io::Result<usize>) -> Result<()> {
        match sent {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                self.dropped += 1;
                if self.dropped == 1 {
                    warn!("UDP sink {} is congested, dropping records", self.addr);
                } else {
                    debug!("UDP sink {} dropped {} records", self.addr, self.dropped);
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Sink for UdpSink {
    fn send(&mut self, record: &OutputRecord) -> Result<()> {
        let bytes = self.format.encode(record)?;
        let sent = self.socket.send_to(&bytes, self.addr);
        self.settle(sent)
    }
}

/// File sink (appends)
pub struct FileSink {
    file: std::io::BufWriter<std::fs::File>,
    format: OutputFormat,
}

impl FileSink {
    pub fn new(path: &std::path::Path, format: OutputFormat) -> Result<Self> {
        use std::fs::OpenOptions;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        Ok(Self {
            file: std::io::BufWriter::new(file),
            format,
        })
    }
}

impl Sink for FileSink {
    fn send(&mut self, record: &OutputRecord) -> Result<()> {
        let bytes = self.format.encode(record)?;
        self.file.write_all(&bytes)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

/// Create a sink from its spec
pub fn create_sink(spec: &SinkSpec, format: OutputFormat) -> Result<Box<dyn Sink>> {
    match spec {
        SinkSpec::Stdout => Ok(Box::new(StdoutSink::new(format))),
        SinkSpec::File { path } => Ok(Box::new(FileSink::new(path, format)?)),
        SinkSpec::Udp { host, port } => Ok(Box::new(UdpSink::new(host, *port, format)?)),
    }
}
