//! Data-channel negotiation parsing and expectation registration

mod expectations;

pub use expectations::ExpectedConnectionTable;

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tracing::debug;

use crate::session::SessionState;
use crate::types::{DataDirection, ExpectedConnection};

/// The closed set of negotiation payload shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationVariant {
    /// Active mode, comma-separated 6-octet encoding (client command)
    Port,
    /// Active mode, delimiter-tagged textual encoding (client command)
    Eprt,
    /// Passive mode, 6-number tuple inside free reply text (server reply)
    Pasv,
    /// Extended passive mode, delimiter-tagged block in reply text
    Epsv,
}

impl NegotiationVariant {
    /// Negotiation mode this payload shape belongs to
    pub fn direction(&self) -> DataDirection {
        match self {
            NegotiationVariant::Port | NegotiationVariant::Eprt => DataDirection::Active,
            NegotiationVariant::Pasv | NegotiationVariant::Epsv => DataDirection::Passive,
        }
    }
}

impl fmt::Display for NegotiationVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationVariant::Port => write!(f, "PORT"),
            NegotiationVariant::Eprt => write!(f, "EPRT"),
            NegotiationVariant::Pasv => write!(f, "PASV"),
            NegotiationVariant::Epsv => write!(f, "EPSV"),
        }
    }
}

/// Parses negotiation payloads and registers the predicted data connections.
///
/// Parsing is best-effort: malformed payloads register nothing and raise no
/// error, matching how the rest of the correlator treats protocol noise. The
/// drops are counted so they are not entirely unobservable.
#[derive(Debug)]
pub struct DataChannelPredictor {
    table: ExpectedConnectionTable,
    parse_failures: AtomicU64,
}

impl DataChannelPredictor {
    /// Create a predictor writing into the given expectation table
    pub fn new(table: ExpectedConnectionTable) -> Self {
        Self {
            table,
            parse_failures: AtomicU64::new(0),
        }
    }

    /// Handle to the expectation table this predictor writes into
    pub fn table(&self) -> &ExpectedConnectionTable {
        &self.table
    }

    /// Parse a negotiation payload into the predicted (host, port).
    ///
    /// `responder` is the control connection's server address; the extended
    /// passive form leaves the host implicit (or unspecified), meaning "same
    /// host as this connection".
    pub fn parse(
        &self,
        variant: NegotiationVariant,
        text: &str,
        responder: IpAddr,
    ) -> Option<(IpAddr, u16)> {
        let parsed = match variant {
            NegotiationVariant::Port => parse_host_port_tuple(text),
            NegotiationVariant::Eprt => parse_delimited(text),
            NegotiationVariant::Pasv => find_host_port_tuple(text),
            NegotiationVariant::Epsv => text
                .find('(')
                .and_then(|open| text[open + 1..].find(')').map(|close| (open, close)))
                .and_then(|(open, close)| parse_delimited(&text[open + 1..open + 1 + close])),
        };

        match parsed {
            Some((host, port)) => {
                let host = if variant == NegotiationVariant::Epsv && host.is_unspecified() {
                    responder
                } else {
                    host
                };
                Some((host, port))
            }
            None => {
                self.parse_failures.fetch_add(1, Ordering::Relaxed);
                debug!("dropping unparseable {} payload: {:?}", variant, text);
                None
            }
        }
    }

    /// Register a successfully parsed endpoint as an expected connection
    pub fn register(
        &self,
        host: IpAddr,
        port: u16,
        session: &SessionState,
        direction: DataDirection,
    ) {
        self.table.insert(ExpectedConnection {
            host,
            port,
            session_uid: session.uid.clone(),
            session: session.conn,
            direction,
            registered_at: Utc::now(),
        });
    }

    /// Negotiation payloads dropped as unparseable so far
    pub fn parse_failure_count(&self) -> u64 {
        self.parse_failures.load(Ordering::Relaxed)
    }
}

/// Parse "h1,h2,h3,h4,p1,p2" into an address and a big-endian port
fn parse_host_port_tuple(text: &str) -> Option<(IpAddr, u16)> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    if parts.len() != 6 {
        return None;
    }
    let mut octets = [0u8; 6];
    for (slot, part) in octets.iter_mut().zip(&parts) {
        *slot = part.parse().ok()?;
    }
    let host = IpAddr::V4(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]));
    let port = u16::from(octets[4]) * 256 + u16::from(octets[5]);
    Some((host, port))
}

/// Find a 6-number comma tuple anywhere in free-form reply text
fn find_host_port_tuple(message: &str) -> Option<(IpAddr, u16)> {
    message
        .split(|c: char| !c.is_ascii_digit() && c != ',')
        .map(|run| run.trim_matches(','))
        .filter(|run| run.bytes().filter(|&b| b == b',').count() == 5)
        .find_map(parse_host_port_tuple)
}

/// Parse "<d>proto<d>addr<d>port<d>" (EPRT) or "<d><d><d>port<d>" (EPSV).
///
/// An absent address stands for the unspecified address; the caller decides
/// what that means.
fn parse_delimited(text: &str) -> Option<(IpAddr, u16)> {
    let delimiter = text.chars().next()?;
    let parts: Vec<&str> = text.split(delimiter).collect();
    if parts.len() != 5 {
        return None;
    }
    let host = if parts[2].is_empty() {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    } else {
        parts[2].parse().ok()?
    };
    let port = parts[3].parse().ok()?;
    Some((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn responder() -> IpAddr {
        "192.0.2.7".parse().unwrap()
    }

    fn predictor() -> DataChannelPredictor {
        DataChannelPredictor::new(ExpectedConnectionTable::new(300))
    }

    #[test]
    fn test_parse_port() {
        let p = predictor();
        let (host, port) = p
            .parse(NegotiationVariant::Port, "10,0,0,1,4,1", responder())
            .unwrap();
        assert_eq!(host, "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(port, 1025);
    }

    #[test]
    fn test_parse_pasv_reply_text() {
        let p = predictor();
        let (host, port) = p
            .parse(
                NegotiationVariant::Pasv,
                "227 Entering Passive Mode (10,0,0,1,4,1).",
                responder(),
            )
            .unwrap();
        assert_eq!(host, "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(port, 1025);
    }

    #[test]
    fn test_parse_eprt_v4_and_v6() {
        let p = predictor();
        let (host, port) = p
            .parse(NegotiationVariant::Eprt, "|1|132.235.1.2|6275|", responder())
            .unwrap();
        assert_eq!(host, "132.235.1.2".parse::<IpAddr>().unwrap());
        assert_eq!(port, 6275);

        let (host, port) = p
            .parse(NegotiationVariant::Eprt, "|2|::1|6276|", responder())
            .unwrap();
        assert_eq!(host, "::1".parse::<IpAddr>().unwrap());
        assert_eq!(port, 6276);
    }

    #[test]
    fn test_epsv_host_defaults_to_responder() {
        let p = predictor();
        let (host, port) = p
            .parse(
                NegotiationVariant::Epsv,
                "229 Entering Extended Passive Mode (|||6446|)",
                responder(),
            )
            .unwrap();
        assert_eq!(host, responder());
        assert_eq!(port, 6446);
    }

    #[test]
    fn test_epsv_unspecified_host_rewritten() {
        let p = predictor();
        let (host, _) = p
            .parse(
                NegotiationVariant::Epsv,
                "229 Ok (|1|0.0.0.0|6446|)",
                responder(),
            )
            .unwrap();
        assert_eq!(host, responder());
    }

    #[test]
    fn test_malformed_payloads_counted() {
        let p = predictor();
        assert!(p
            .parse(NegotiationVariant::Port, "10,0,0,1,4", responder())
            .is_none());
        assert!(p
            .parse(NegotiationVariant::Port, "10,0,0,256,4,1", responder())
            .is_none());
        assert!(p
            .parse(NegotiationVariant::Epsv, "229 no block here", responder())
            .is_none());
        assert!(p
            .parse(NegotiationVariant::Pasv, "227 nothing useful", responder())
            .is_none());
        assert_eq!(p.parse_failure_count(), 4);
    }

    #[test]
    fn test_variant_directions() {
        assert_eq!(NegotiationVariant::Port.direction(), DataDirection::Active);
        assert_eq!(NegotiationVariant::Epsv.direction(), DataDirection::Passive);
    }
}
