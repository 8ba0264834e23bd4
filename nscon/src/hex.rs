//! A very simple hex-string codec for byte buffers.

use thiserror::Error;

/// Formats a byte buffer as a lowercase hex string, inserting `separator`
/// between bytes.
pub fn to_hex(bytes: &[u8], separator: &str) -> String {
    bytes
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<String>>()
        .join(separator)
}

/// Parses a hex string without separators back into its bytes.
pub fn parse_hex(src: &str) -> Result<Vec<u8>, ParseHexError> {
    if src.len() % 2 != 0 {
        return Err(ParseHexError::OddLength);
    }

    (0..src.len())
        .step_by(2)
        .map(|i| {
            src.get(i..i + 2)
                .ok_or(ParseHexError::InvalidDigit)
                .and_then(|pair| {
                    u8::from_str_radix(pair, 16).map_err(|_| ParseHexError::InvalidDigit)
                })
        })
        .collect()
}

/// Represents an error that occurred while parsing a hex string.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum ParseHexError {
    /// Indicates that the input does not contain a whole number of bytes.
    #[error("hex strings require an even number of digits")]
    OddLength,

    /// Indicates that the input contains a character outside `[0-9a-fA-F]`.
    #[error("encountered a character that is no hex digit")]
    InvalidDigit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_separator() {
        assert_eq!(
            to_hex(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff], ":"),
            "aa:bb:cc:dd:ee:ff"
        );
        assert_eq!(to_hex(&[0x31, 0x32, 0x32], ""), "313232");
        assert_eq!(to_hex(&[], ":"), "");
    }

    #[test]
    fn parse_round_trips() {
        for bytes in [vec![0x00, 0x00, 0x00], vec![0x1e, 0xdc, 0x00], vec![0xff; 3]] {
            assert_eq!(parse_hex(&to_hex(&bytes, "")).unwrap(), bytes);
        }
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse_hex("fff"), Err(ParseHexError::OddLength));
        assert_eq!(parse_hex("zz"), Err(ParseHexError::InvalidDigit));
    }
}
