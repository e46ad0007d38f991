//! Common Utilities
//!
//! Provides utility functions used across the protocol stack

use thiserror::Error;

/// Errors raised while parsing textual configuration values
#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Invalid hex string: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("Expected {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}

/// Convert a byte slice to hex string for debugging
pub fn bytes_to_hex(data: &[u8]) -> String {
    data.chunks(1).map(hex::encode).collect::<Vec<_>>().join(" ")
}

/// Parse a contiguous hex string ("00112233..."), whitespace is ignored
pub fn hex_to_bytes(text: &str) -> Result<Vec<u8>, ParseError> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(hex::decode(digits)?)
}

/// Parse a hex string into a fixed-size array
pub fn hex_to_array<const N: usize>(text: &str) -> Result<[u8; N], ParseError> {
    let bytes = hex_to_bytes(text)?;
    bytes.as_slice().try_into().map_err(|_| ParseError::WrongLength {
        expected: N,
        actual: bytes.len(),
    })
}
