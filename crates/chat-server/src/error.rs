//! Error types for the chat service.
//!
//! Only binding the listening endpoint is fatal. Everything that goes
//! wrong after that (accept failures, client I/O, closing a departing
//! client) is reported through [`ServiceObserver`](crate::observer::ServiceObserver)
//! and never surfaces as an error value.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Another socket already listens on the requested port.
    #[error("address {addr} is already in use")]
    AddressInUse {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Any other failure while creating the listening endpoint.
    #[error("failed to listen on {addr}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

impl ServiceError {
    pub(crate) fn bind(addr: impl Into<String>, source: io::Error) -> Self {
        let addr = addr.into();
        if source.kind() == io::ErrorKind::AddrInUse {
            ServiceError::AddressInUse { addr, source }
        } else {
            ServiceError::Bind { addr, source }
        }
    }
}
