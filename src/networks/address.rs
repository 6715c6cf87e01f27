//! Peer address validation
//!
//! An address must first parse as a multiaddr, then describe a dialable
//! IPFS peer: a host component, a `/tcp` or `/udp` port, and a trailing
//! `/p2p/<peer-id>`.

use multiaddr::{Multiaddr, Protocol};

use crate::types::PorticoError;

/// Why an address was rejected
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressError {
    /// Not a multiaddr at all
    #[error("{address} is not a valid multiaddr: {reason}")]
    Syntax { address: String, reason: String },

    /// A multiaddr, but not one that reaches an IPFS peer
    #[error("{address} is not a valid ipfs peer address: {reason}")]
    NotAPeer { address: String, reason: String },
}

impl From<AddressError> for PorticoError {
    fn from(err: AddressError) -> Self {
        PorticoError::Validation(err.to_string())
    }
}

/// Phase one: parse into a structured multiaddr
pub fn parse_multiaddr(address: &str) -> Result<Multiaddr, AddressError> {
    address
        .trim()
        .parse::<Multiaddr>()
        .map_err(|e| AddressError::Syntax {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Phase two: confirm the multiaddr names a reachable IPFS peer
pub fn check_peer(address: &str, addr: &Multiaddr) -> Result<(), AddressError> {
    let not_a_peer = |reason: &str| AddressError::NotAPeer {
        address: address.to_string(),
        reason: reason.to_string(),
    };
    let components: Vec<Protocol<'_>> = addr.iter().collect();

    match components.first() {
        Some(
            Protocol::Ip4(_)
            | Protocol::Ip6(_)
            | Protocol::Dns(_)
            | Protocol::Dns4(_)
            | Protocol::Dns6(_)
            | Protocol::Dnsaddr(_),
        ) => {}
        _ => return Err(not_a_peer("must start with an ip4, ip6 or dns component")),
    }

    match components.get(1) {
        Some(Protocol::Tcp(_) | Protocol::Udp(_)) => {}
        _ => return Err(not_a_peer("host must be followed by a tcp or udp port")),
    }

    match components.last() {
        Some(Protocol::P2p(_)) => Ok(()),
        _ => Err(not_a_peer("must end with a /p2p/<peer-id> component")),
    }
}

/// Run both validation phases, stopping at the first failure
pub fn validate_peer_address(address: &str) -> Result<Multiaddr, AddressError> {
    let addr = parse_multiaddr(address)?;
    check_peer(address, &addr)?;
    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: &str = "QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN";

    #[test]
    fn test_valid_peer_addresses() {
        for addr in [
            format!("/ip4/10.0.0.1/tcp/4001/p2p/{PEER}"),
            format!("/ip6/::1/tcp/4001/p2p/{PEER}"),
            format!("/dns4/node.example.com/udp/4001/quic-v1/p2p/{PEER}"),
        ] {
            assert!(validate_peer_address(&addr).is_ok(), "{addr}");
        }
    }

    #[test]
    fn test_syntax_failure_names_address() {
        let err = validate_peer_address("not-a-multiaddr").unwrap_err();
        assert!(matches!(err, AddressError::Syntax { .. }));
        assert!(err.to_string().contains("not-a-multiaddr"));
    }

    #[test]
    fn test_semantic_failures() {
        let missing_peer = "/ip4/10.0.0.1/tcp/4001";
        let err = validate_peer_address(missing_peer).unwrap_err();
        assert!(matches!(err, AddressError::NotAPeer { .. }));
        assert!(err.to_string().contains(missing_peer));

        let no_port = format!("/ip4/10.0.0.1/p2p/{PEER}");
        assert!(matches!(
            validate_peer_address(&no_port),
            Err(AddressError::NotAPeer { .. })
        ));

        let no_host = format!("/tcp/4001/p2p/{PEER}");
        assert!(matches!(
            validate_peer_address(&no_host),
            Err(AddressError::NotAPeer { .. })
        ));
    }

    #[test]
    fn test_maps_to_validation_error() {
        let err: PorticoError = validate_peer_address("garbage").unwrap_err().into();
        assert_eq!(err.kind(), crate::types::ErrorKind::ValidationError);
    }
}
