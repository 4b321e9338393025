//! # Encoding Module
//!
//! On-disk integer encoding for chainhash:
//!
//! - **Varint encoding**: unsigned base-128 variable-length integers,
//!   written into fixed-width zero-padded fields

pub mod varint;

pub use varint::{decode_varint, encode_varint, varint_len};
