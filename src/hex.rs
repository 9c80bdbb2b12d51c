//! Conversions between hexadecimal text and bytes

/// Pack the hex digits of `text` into bytes, most significant nibble first.
///
/// Characters other than `0-9`, `A-F` and `a-f` are skipped. With an odd number of digits the
/// last byte gets a zero low nibble.
///
/// ```
/// assert_eq!(serialport_poll::ascii_to_hex("A4-a3 8"), vec![0xA4, 0xA3, 0x80]);
/// ```
pub fn ascii_to_hex(text: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(text.len() / 2 + 1);
    let mut high: Option<u8> = None;
    for nibble in text.chars().filter_map(|c| c.to_digit(16)) {
        let nibble = nibble as u8;
        high = match high {
            None => Some(nibble << 4),
            Some(high) => {
                bytes.push(high | nibble);
                None
            }
        };
    }
    bytes.extend(high);
    bytes
}

/// Render bytes as uppercase hex, two characters per byte with no separators
///
/// ```
/// assert_eq!(serialport_poll::hex_to_ascii(&[0xA4, 0x0F]), "A40F");
/// ```
pub fn hex_to_ascii(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let mut text = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        text.push(DIGITS[usize::from(byte >> 4)] as char);
        text.push(DIGITS[usize::from(byte & 0x0F)] as char);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_digit_count_pads_low_nibble() {
        assert_eq!(ascii_to_hex("A4a38"), vec![0xA4, 0xA3, 0x80]);
    }

    #[test]
    fn non_hex_is_ignored() {
        assert_eq!(ascii_to_hex("A4-a3 8"), ascii_to_hex("A4a38"));
        assert_eq!(ascii_to_hex("0x1G2z"), vec![0x01, 0x20]);
        assert!(ascii_to_hex("").is_empty());
        assert!(ascii_to_hex("xyz!").is_empty());
    }

    #[test]
    fn renders_uppercase() {
        assert_eq!(hex_to_ascii(&[]), "");
        assert_eq!(hex_to_ascii(&[0x00, 0x09, 0xab, 0xff]), "0009ABFF");
    }

    #[test]
    fn round_trip_gives_canonical_form() {
        for text in ["deadBEEF", "0123456789abcdef", "a", "A4a38"] {
            let mut canonical = text.to_uppercase();
            if canonical.len() % 2 == 1 {
                canonical.push('0');
            }
            assert_eq!(hex_to_ascii(&ascii_to_hex(text)), canonical);
        }
    }
}
