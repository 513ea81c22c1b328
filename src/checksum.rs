//! Component C — NMEA XOR checksum (§4.C).

use crate::error::{Result, RtkError};

/// XOR of every byte in `bytes`.
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Build a complete `$BODY*HH\r\n` sentence from a body that does not yet
/// include the leading `$` or the trailing checksum.
pub fn format_sentence(body: &str) -> String {
    let cks = xor_checksum(body.as_bytes());
    format!("${body}*{cks:02X}\r\n")
}

/// Verify the checksum of a complete sentence of the form `$BODY*HH` (the
/// trailing `\r\n`, if present, is ignored). The body for checksum purposes
/// excludes the leading `$`, the `*`, and the two hex digits (§4.C).
pub fn verify_sentence(sentence: &[u8]) -> Result<()> {
    let s = trim_crlf(sentence);
    let star = s
        .iter()
        .rposition(|&b| b == b'*')
        .ok_or_else(|| RtkError::ParseError("sentence has no checksum marker".into()))?;
    if s.len() < star + 3 || s.is_empty() || s[0] != b'$' {
        return Err(RtkError::ParseError("malformed sentence".into()));
    }
    let hex = std::str::from_utf8(&s[star + 1..star + 3])
        .map_err(|_| RtkError::ParseError("non-UTF8 checksum digits".into()))?;
    let expected =
        u8::from_str_radix(hex, 16).map_err(|_| RtkError::ParseError(format!("bad checksum digits {hex}")))?;
    let computed = xor_checksum(&s[1..star]);
    if computed == expected {
        Ok(())
    } else {
        Err(RtkError::ChecksumMismatch)
    }
}

fn trim_crlf(s: &[u8]) -> &[u8] {
    let mut end = s.len();
    while end > 0 && (s[end - 1] == b'\n' || s[end - 1] == b'\r') {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_then_verify_round_trips() {
        let sentence = format_sentence("PROY108");
        verify_sentence(sentence.as_bytes()).unwrap();
    }

    #[test]
    fn verify_rejects_mutated_checksum() {
        let mut sentence = format_sentence("PROY108").into_bytes();
        let star = sentence.iter().rposition(|&b| b == b'*').unwrap();
        // Flip one hex digit of the checksum.
        sentence[star + 1] = if sentence[star + 1] == b'0' { b'1' } else { b'0' };
        assert!(matches!(verify_sentence(&sentence), Err(RtkError::ChecksumMismatch)));
    }

    #[test]
    fn verify_known_sentence() {
        // $LOG108,2,0,0,0,0,5,192,3,47*HH\r\n from §8 scenario 1.
        let body = "LOG108,2,0,0,0,0,5,192,3,47";
        let sentence = format_sentence(body);
        verify_sentence(sentence.as_bytes()).unwrap();
    }
}
