#![deny(missing_docs)]

//! A byte-exact decoder for BMP messages ([RFC7854](https://tools.ietf.org/html/rfc7854))
//! and the BGP messages they carry.
//!
//! BMP (BGP Monitoring Protocol) is a method for BGP-speakers, typically network routers
//! to provide telemetry relating to BGP state.
//!
//! Decoding is pure: [`decode_bmp_record`] turns one record's bytes into a [`types::BmpRecord`]
//! without keeping any state between calls. [`decode_stream`] and [`from_reader`] frame
//! records out of blocking and async readers respectively.
//!
//! ## Errors
//! Nothing in here panics on bad input. Every length on the wire is checked against the
//! bytes actually available, and a record that doesn't add up fails with an [`Error`]
//! without reading past its own end.

mod codec;
mod decoder;
mod error;
mod utils;

pub use codec::{decode_stream, decode_stream_with_max_length, from_reader, Records};
pub use decoder::{decode_bmp_record, BmpDecoder, DEFAULT_MAX_RECORD_LENGTH};
pub use error::{Error, Result};
pub use utils::Afi;

/// BGP messages embedded in BMP records
pub mod bgp;
/// BMP records and their payloads
pub mod types;
