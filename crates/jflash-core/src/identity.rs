//! Probe identity selection
//!
//! A probe is addressed either by USB serial number or by IP endpoint,
//! never both. The enum makes the "exactly one" rule structural; the only
//! place a configuration error can arise is the constructor that folds
//! two optional CLI parameters into an identity.

use core::fmt;

use crate::error::{Error, Result};

/// How to reach a probe: exactly one of USB serial or IP endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeIdentity {
    /// USB-attached probe selected by serial number.
    Usb(u32),
    /// Network-attached probe at `host:port` (passed through verbatim to
    /// the native layer).
    Ip(String),
}

impl ProbeIdentity {
    /// Build an identity from the two optional user parameters.
    ///
    /// Fails with [`Error::Configuration`] if both or neither are given.
    pub fn from_options(serial: Option<u32>, ip: Option<&str>) -> Result<Self> {
        match (serial, ip) {
            (Some(s), None) => Ok(ProbeIdentity::Usb(s)),
            (None, Some(ip)) => {
                if ip.is_empty() {
                    return Err(Error::Configuration("empty IP endpoint".into()));
                }
                Ok(ProbeIdentity::Ip(ip.to_string()))
            }
            (Some(_), Some(_)) => Err(Error::Configuration(
                "serial number and IP endpoint are mutually exclusive".into(),
            )),
            (None, None) => Err(Error::Configuration(
                "either a serial number or an IP endpoint is required".into(),
            )),
        }
    }
}

impl fmt::Display for ProbeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeIdentity::Usb(serial) => write!(f, "usb:{serial}"),
            ProbeIdentity::Ip(endpoint) => write!(f, "ip:{endpoint}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_only() {
        let id = ProbeIdentity::from_options(Some(600104842), None).unwrap();
        assert_eq!(id, ProbeIdentity::Usb(600104842));
    }

    #[test]
    fn ip_only() {
        let id = ProbeIdentity::from_options(None, Some("192.168.1.17:19020")).unwrap();
        assert_eq!(id, ProbeIdentity::Ip("192.168.1.17:19020".into()));
    }

    #[test]
    fn both_rejected() {
        let err = ProbeIdentity::from_options(Some(1), Some("10.0.0.1:19020")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn neither_rejected() {
        let err = ProbeIdentity::from_options(None, None).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn empty_ip_rejected() {
        let err = ProbeIdentity::from_options(None, Some("")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
