//! Concrete authentication mechanisms.
//!
//! SCRAM lives in [`crate::scram`] because the default mechanism and the
//! explicit SCRAM credentials share it.

pub mod aws;
pub mod default;
pub mod gssapi;
pub mod mongodb_cr;
pub mod plain;
pub(crate) mod sigv4;
pub mod x509;
