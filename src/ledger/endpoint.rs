use crate::error::CollaboratorError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Hosts an RPC ledger endpoint may name
pub const TRUSTED_HOSTS: [&str; 4] = ["localhost", "127.0.0.1", "0.0.0.0", "::1"];

/// A ledger location that passed the local-only allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEndpoint {
    /// `memory://`
    Memory,
    /// `file:///path`, `file://localhost/path` or a bare path
    File(PathBuf),
    /// `http(s)://<trusted host>[:port]`
    Rpc {
        scheme: String,
        host: String,
        port: Option<u16>,
    },
}

impl LedgerEndpoint {
    pub fn parse(raw: &str) -> Result<Self, CollaboratorError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CollaboratorError::InvalidInput(
                "ledger endpoint is empty".to_string(),
            ));
        }

        let Some((scheme, rest)) = raw.split_once("://") else {
            return Ok(LedgerEndpoint::File(PathBuf::from(raw)));
        };

        match scheme.to_ascii_lowercase().as_str() {
            "memory" if rest.is_empty() => Ok(LedgerEndpoint::Memory),
            "memory" => Err(CollaboratorError::InvalidInput(format!(
                "memory endpoint takes no location: {}",
                raw
            ))),
            "file" => Self::parse_file(raw, rest),
            "http" | "https" => Self::parse_rpc(raw, scheme, rest),
            other => Err(CollaboratorError::InvalidInput(format!(
                "unsupported ledger scheme '{}'",
                other
            ))),
        }
    }

    fn parse_file(raw: &str, rest: &str) -> Result<Self, CollaboratorError> {
        let path = if rest.starts_with('/') {
            rest.to_string()
        } else {
            let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
            if !host.eq_ignore_ascii_case("localhost") {
                return Err(CollaboratorError::UntrustedEndpoint(raw.to_string()));
            }
            format!("/{}", path)
        };

        if path == "/" {
            return Err(CollaboratorError::InvalidInput(format!(
                "file endpoint has no path: {}",
                raw
            )));
        }

        Ok(LedgerEndpoint::File(PathBuf::from(path)))
    }

    fn parse_rpc(raw: &str, scheme: &str, rest: &str) -> Result<Self, CollaboratorError> {
        let authority = rest.split('/').next().unwrap_or_default();

        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            let (host, tail) = bracketed.split_once(']').ok_or_else(|| {
                CollaboratorError::InvalidInput(format!("unterminated IPv6 host: {}", raw))
            })?;
            (host, tail.strip_prefix(':'))
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            }
        };

        let port = port
            .map(|p| {
                p.parse::<u16>().map_err(|_| {
                    CollaboratorError::InvalidInput(format!("invalid port '{}' in {}", p, raw))
                })
            })
            .transpose()?;

        let host = host.to_ascii_lowercase();
        if !TRUSTED_HOSTS.contains(&host.as_str()) {
            return Err(CollaboratorError::UntrustedEndpoint(raw.to_string()));
        }

        Ok(LedgerEndpoint::Rpc {
            scheme: scheme.to_ascii_lowercase(),
            host,
            port,
        })
    }
}

impl FromStr for LedgerEndpoint {
    type Err = CollaboratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for LedgerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerEndpoint::Memory => write!(f, "memory://"),
            LedgerEndpoint::File(path) if path.is_absolute() => {
                write!(f, "file://{}", path.display())
            }
            LedgerEndpoint::File(path) => write!(f, "{}", path.display()),
            LedgerEndpoint::Rpc { scheme, host, port } => {
                let host = if host.contains(':') {
                    format!("[{}]", host)
                } else {
                    host.clone()
                };
                match port {
                    Some(port) => write!(f, "{}://{}:{}", scheme, host, port),
                    None => write!(f, "{}://{}", scheme, host),
                }
            }
        }
    }
}
