//! X.509 certificate extensions for Internet number resources.
//!
//! RFC 3779 defines two certificate extensions that bind Internet number
//! resources to the subject of a certificate: one for IP address resources
//! and one for Autonomous System identifiers. A certificate chain is only
//! valid if every certificate limits itself to resources also held by its
//! issuer, which makes the extensions the foundation of resource
//! certification.
//!
//! This crate implements the core machinery for both extensions:
//!
//! * the wire form – decoding and encoding of the DER representation via
//!   the [bcder] crate ([`ipres`], [`asres`]),
//! * the canonical form – sorting, merging of overlapping and adjacent
//!   elements, and collapsing of ranges that cover exactly one prefix,
//! * the configuration text form used to author extension values
//!   ([`conf`]),
//! * a diagnostic text form for dumping decoded values, and
//! * path validation of the nested resources requirement along a
//!   certificate chain ([`validation`]).
//!
//! Certificate parsing, chain building, and signature verification are
//! the business of the enclosing certificate library. It attaches decoded
//! extension values to its certificates and hands a finished chain to the
//! validator.
//!
//! [bcder]: https://crates.io/crates/bcder
//! [`ipres`]: ipres/index.html
//! [`asres`]: asres/index.html
//! [`conf`]: conf/index.html
//! [`validation`]: validation/index.html

pub mod addr;
pub mod asres;
pub mod conf;
pub mod error;
pub mod ipres;
pub mod validation;
