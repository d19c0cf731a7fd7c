//! # Rover endpoint addressing
//!
//! A rover is reached either physically, through the local BLE bridge daemon,
//! or as a simulator process listening on an IP address. Both are addressed
//! here as zmq endpoints so the networking layer does not care which one it
//! is talking to.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// TCP port the BLE bridge daemon listens on locally.
pub const BLE_BRIDGE_PORT: u16 = 4202;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The kind of rover a controller is built against.
///
/// Chosen once at construction, this selects the transport adapter variant
/// and the addressing scheme. It cannot be changed on a live controller.
#[derive(Debug, Serialize, Deserialize, Copy, Clone, Eq, PartialEq)]
pub enum ConnectionTarget {
    /// A physical rover reached over BLE through the local bridge daemon.
    Physical,

    /// A simulated rover reached over a local IP connection.
    Simulator,
}

/// A resolved rover endpoint address.
#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub enum Endpoint {
    /// The rover's pairing code, as displayed on the rover's screen. The
    /// bridge daemon maps the code onto the BLE device.
    BleBridge { rover_code: u16 },

    /// Host and port of a simulator instance.
    Tcp { host: String, port: u16 },
}

/// Errors raised while parsing an endpoint address.
#[derive(Debug, Error)]
pub enum EndpointParseError {
    #[error("A physical rover address must be a four digit pairing code, got {0:?}")]
    InvalidRoverCode(String),

    #[error("A simulator address must be host:port, got {0:?}")]
    InvalidHostPort(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ConnectionTarget {
    /// Parse an address string into the endpoint form this target expects.
    ///
    /// Physical targets expect the four digit pairing code displayed on the
    /// rover. Simulator targets expect `host:port`.
    pub fn parse_address(&self, address: &str) -> Result<Endpoint, EndpointParseError> {
        match self {
            ConnectionTarget::Physical => {
                let code = match address.parse::<u16>() {
                    Ok(c) if address.len() == 4 => c,
                    _ => return Err(EndpointParseError::InvalidRoverCode(address.into())),
                };
                Ok(Endpoint::BleBridge { rover_code: code })
            }
            ConnectionTarget::Simulator => {
                let mut parts = address.rsplitn(2, ':');
                let port = parts
                    .next()
                    .and_then(|p| p.parse::<u16>().ok())
                    .ok_or_else(|| EndpointParseError::InvalidHostPort(address.into()))?;
                let host = match parts.next() {
                    Some(h) if !h.is_empty() => h.to_string(),
                    _ => return Err(EndpointParseError::InvalidHostPort(address.into())),
                };
                Ok(Endpoint::Tcp { host, port })
            }
        }
    }
}

impl FromStr for ConnectionTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "physical" => Ok(ConnectionTarget::Physical),
            "simulator" | "sim" => Ok(ConnectionTarget::Simulator),
            _ => Err(format!(
                "{:?} is not a connection target (expected physical or simulator)",
                s
            )),
        }
    }
}

impl Endpoint {
    /// Format this endpoint as a zmq endpoint string.
    pub fn to_zmq_endpoint(&self) -> String {
        match self {
            Endpoint::BleBridge { rover_code: _ } => {
                // The bridge daemon always lives on localhost; the rover code
                // is carried in the demand messages, not the address.
                format!("tcp://127.0.0.1:{}", BLE_BRIDGE_PORT)
            }
            Endpoint::Tcp { host, port } => format!("tcp://{}:{}", host, port),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Endpoint::BleBridge { rover_code } => write!(f, "BLE rover {}", rover_code),
            Endpoint::Tcp { host, port } => write!(f, "simulator at {}:{}", host, port),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_physical_address() {
        let ep = ConnectionTarget::Physical.parse_address("1234").unwrap();
        assert_eq!(ep, Endpoint::BleBridge { rover_code: 1234 });

        // Not a four digit code
        assert!(ConnectionTarget::Physical.parse_address("12").is_err());
        assert!(ConnectionTarget::Physical.parse_address("abcd").is_err());
    }

    #[test]
    fn test_parse_simulator_address() {
        let ep = ConnectionTarget::Simulator
            .parse_address("127.0.0.1:9000")
            .unwrap();
        assert_eq!(
            ep,
            Endpoint::Tcp {
                host: "127.0.0.1".into(),
                port: 9000
            }
        );

        assert!(ConnectionTarget::Simulator.parse_address("9000").is_err());
        assert!(ConnectionTarget::Simulator
            .parse_address("localhost:notaport")
            .is_err());
    }
}
