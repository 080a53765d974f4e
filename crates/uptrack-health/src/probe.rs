//! Probe logic.
//!
//! Measures round-trip time to an endpoint either by opening a TCP
//! connection or by issuing an HTTP GET. Probe errors never reach the
//! aggregate: [`into_observation`] turns them into failed observations.

use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use uptrack_core::config::{ProbeConfig, ProbeKind};
use uptrack_core::Observation;

/// A successful probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeReport {
    pub latency_ms: f64,
    /// When the probe was started.
    pub at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid probe target {0:?}")]
    InvalidTarget(String),

    #[error("connection to {address} failed: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    #[error("probe of {address} timed out after {timeout:?}")]
    Timeout { address: String, timeout: Duration },

    #[error("http exchange with {address} failed: {reason}")]
    Http { address: String, reason: String },

    #[error("{address} answered with status {status}")]
    Status { address: String, status: u16 },
}

/// Anything that can check an endpoint address.
pub trait Prober: Send + Sync + 'static {
    fn probe(&self, target: &str) -> impl Future<Output = Result<ProbeReport, ProbeError>> + Send;
}

/// Translate a probe outcome into an observation; failures carry no latency.
pub fn into_observation(
    result: Result<ProbeReport, ProbeError>,
    fallback_at: DateTime<Utc>,
) -> Observation {
    match result {
        Ok(report) => Observation::success(report.at, report.latency_ms),
        Err(_) => Observation::failure(fallback_at),
    }
}

// ── Target parsing ─────────────────────────────────────────────────

/// `host:port` plus request path, split out of an endpoint url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub scheme: Option<String>,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl ProbeTarget {
    /// Accepts `host`, `host:port`, `[v6]:port` and `scheme://host[:port][/path]`.
    pub fn parse(url: &str, default_port: u16) -> Result<Self, ProbeError> {
        let invalid = || ProbeError::InvalidTarget(url.to_string());
        let trimmed = url.trim();

        let (scheme, rest) = match trimmed.split_once("://") {
            Some((scheme, rest)) => (Some(scheme.to_ascii_lowercase()), rest),
            None => (None, trimmed),
        };
        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };

        let implied_port = match scheme.as_deref() {
            Some("http") => 80,
            Some("https") => 443,
            _ => default_port,
        };

        let (host, port) = if let Some(v6) = authority.strip_prefix('[') {
            let (host, after) = v6.split_once(']').ok_or_else(invalid)?;
            let port = match after.strip_prefix(':') {
                Some(p) => p.parse::<u16>().map_err(|_| invalid())?,
                None if after.is_empty() => implied_port,
                None => return Err(invalid()),
            };
            (host.to_string(), port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, p)) => (host.to_string(), p.parse::<u16>().map_err(|_| invalid())?),
                None => (authority.to_string(), implied_port),
            }
        };

        if host.is_empty() || port == 0 {
            return Err(invalid());
        }

        Ok(Self {
            scheme,
            host,
            port,
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
        })
    }

    /// Socket address string suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

// ── TCP ────────────────────────────────────────────────────────────

/// Measures TCP connect time.
#[derive(Debug, Clone)]
pub struct TcpProber {
    pub timeout: Duration,
    pub default_port: u16,
}

impl Prober for TcpProber {
    async fn probe(&self, target: &str) -> Result<ProbeReport, ProbeError> {
        let target = ProbeTarget::parse(target, self.default_port)?;
        let address = target.address();
        let at = Utc::now();
        let started = Instant::now();

        match tokio::time::timeout(self.timeout, tokio::net::TcpStream::connect(&address)).await {
            Ok(Ok(_stream)) => Ok(ProbeReport {
                latency_ms: elapsed_ms(started),
                at,
            }),
            Ok(Err(source)) => {
                debug!(error = %source, %address, "tcp probe connection failed");
                Err(ProbeError::Connect { address, source })
            }
            Err(_) => {
                debug!(%address, "tcp probe timed out");
                Err(ProbeError::Timeout {
                    address,
                    timeout: self.timeout,
                })
            }
        }
    }
}

// ── HTTP ───────────────────────────────────────────────────────────

/// Issues a plain HTTP/1.1 GET; only 2xx counts as up.
#[derive(Debug, Clone)]
pub struct HttpProber {
    pub timeout: Duration,
    pub default_port: u16,
    /// Path used when the endpoint url has none.
    pub path: String,
}

impl Prober for HttpProber {
    async fn probe(&self, target: &str) -> Result<ProbeReport, ProbeError> {
        let mut target = ProbeTarget::parse(target, self.default_port)?;
        if target.scheme.as_deref() == Some("https") {
            return Err(ProbeError::InvalidTarget(format!(
                "{target:?}: https is not supported by the http probe"
            )));
        }
        if target.path == "/" {
            target.path = self.path.clone();
        }
        let address = target.address();
        let at = Utc::now();
        let started = Instant::now();

        match tokio::time::timeout(self.timeout, http_get(&target, &address)).await {
            Ok(Ok(status)) if (200..300).contains(&status) => Ok(ProbeReport {
                latency_ms: elapsed_ms(started),
                at,
            }),
            Ok(Ok(status)) => {
                debug!(status, %address, "http probe non-2xx");
                Err(ProbeError::Status { address, status })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                debug!(%address, "http probe timed out");
                Err(ProbeError::Timeout {
                    address,
                    timeout: self.timeout,
                })
            }
        }
    }
}

async fn http_get(target: &ProbeTarget, address: &str) -> Result<u16, ProbeError> {
    let stream = tokio::net::TcpStream::connect(address)
        .await
        .map_err(|source| ProbeError::Connect {
            address: address.to_string(),
            source,
        })?;

    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| ProbeError::Http {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let req = http::Request::builder()
        .method("GET")
        .uri(&target.path)
        .header("host", address)
        .header("user-agent", "uptrack-health/0.1")
        .body(http_body_util::Empty::<bytes::Bytes>::new())
        .map_err(|e| ProbeError::Http {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

    let resp = sender.send_request(req).await.map_err(|e| ProbeError::Http {
        address: address.to_string(),
        reason: e.to_string(),
    })?;
    Ok(resp.status().as_u16())
}

// ── Configured ─────────────────────────────────────────────────────

/// The prober selected by `[probe] kind` in the config file.
#[derive(Debug, Clone)]
pub enum AnyProber {
    Tcp(TcpProber),
    Http(HttpProber),
}

impl AnyProber {
    pub fn from_config(config: &ProbeConfig, timeout: Duration) -> Self {
        match config.kind {
            ProbeKind::Tcp => AnyProber::Tcp(TcpProber {
                timeout,
                default_port: config.default_port,
            }),
            ProbeKind::Http => AnyProber::Http(HttpProber {
                timeout,
                default_port: config.default_port,
                path: config.path.clone(),
            }),
        }
    }
}

impl Prober for AnyProber {
    async fn probe(&self, target: &str) -> Result<ProbeReport, ProbeError> {
        match self {
            AnyProber::Tcp(p) => p.probe(target).await,
            AnyProber::Http(p) => p.probe(target).await,
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
