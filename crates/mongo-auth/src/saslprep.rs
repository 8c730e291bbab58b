//! SASLprep (RFC 4013) for SCRAM-SHA-256 passwords.
//!
//! Covers the mapping tables (B.1 and C.1.2) and the prohibition tables
//! (C.1.2 through C.9). Unicode normalization (NFKC) and the bidirectional
//! check are not applied; inputs needing them are passed through mapped but
//! otherwise unchanged.

use std::borrow::Cow;

use thiserror::Error;

/// Input contains a character SASLprep forbids.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("prohibited character U+{:04X} in SASLprep input", u32::from(*.0))]
pub struct ProhibitedCharacter(pub char);

/// Prepare a string with SASLprep.
pub fn saslprep(input: &str) -> Result<Cow<'_, str>, ProhibitedCharacter> {
    if input.bytes().all(|b| (0x20..0x7f).contains(&b)) {
        return Ok(Cow::Borrowed(input));
    }

    let mut output = String::with_capacity(input.len());
    for c in input.chars() {
        if is_non_ascii_space(c) {
            output.push(' ');
        } else if !is_mapped_to_nothing(c) {
            output.push(c);
        }
    }

    if let Some(c) = output.chars().find(|c| is_prohibited(*c)) {
        return Err(ProhibitedCharacter(c));
    }
    Ok(Cow::Owned(output))
}

// RFC 3454 table C.1.2
fn is_non_ascii_space(c: char) -> bool {
    matches!(
        c,
        '\u{00A0}' | '\u{1680}' | '\u{2000}'..='\u{200B}' | '\u{202F}' | '\u{205F}' | '\u{3000}'
    )
}

// RFC 3454 table B.1
fn is_mapped_to_nothing(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}'
            | '\u{034F}'
            | '\u{1806}'
            | '\u{180B}'..='\u{180D}'
            | '\u{200B}'..='\u{200D}'
            | '\u{2060}'
            | '\u{FE00}'..='\u{FE0F}'
            | '\u{FEFF}'
    )
}

// RFC 3454 tables C.2.1 through C.9
fn is_prohibited(c: char) -> bool {
    let cp = u32::from(c);
    matches!(
        c,
        // C.2.1 ASCII control
        '\u{0000}'..='\u{001F}' | '\u{007F}'
        // C.2.2 non-ASCII control
        | '\u{0080}'..='\u{009F}'
        | '\u{06DD}' | '\u{070F}' | '\u{180E}' | '\u{200C}' | '\u{200D}' | '\u{2028}' | '\u{2029}'
        | '\u{2060}'..='\u{2063}' | '\u{206A}'..='\u{206F}' | '\u{FEFF}' | '\u{FFF9}'..='\u{FFFC}'
        | '\u{1D173}'..='\u{1D17A}'
        // C.3 private use
        | '\u{E000}'..='\u{F8FF}' | '\u{F0000}'..='\u{FFFFD}' | '\u{100000}'..='\u{10FFFD}'
        // C.4 non-character (the per-plane xFFFE/xFFFF pairs are checked below)
        | '\u{FDD0}'..='\u{FDEF}'
        // C.6 inappropriate for plain text
        | '\u{FFFD}'
        // C.7 inappropriate for canonical representation
        | '\u{2FF0}'..='\u{2FFB}'
        // C.8 change display properties
        | '\u{0340}' | '\u{0341}' | '\u{200E}' | '\u{200F}' | '\u{202A}'..='\u{202E}'
        // C.9 tagging
        | '\u{E0001}' | '\u{E0020}'..='\u{E007F}'
    ) || (cp & 0xFFFE) == 0xFFFE
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passes_through_borrowed() {
        assert!(matches!(saslprep("pencil").unwrap(), Cow::Borrowed("pencil")));
    }

    // RFC 4013 section 3 examples
    #[test]
    fn test_rfc_examples() {
        assert_eq!(saslprep("I\u{00AD}X").unwrap(), "IX");
        assert_eq!(saslprep("user").unwrap(), "user");
        assert_eq!(saslprep("USER").unwrap(), "USER");
        assert_eq!(saslprep("\u{0007}"), Err(ProhibitedCharacter('\u{0007}')));
    }

    #[test]
    fn test_non_ascii_space_maps_to_space() {
        assert_eq!(saslprep("a\u{00A0}b\u{3000}c").unwrap(), "a b c");
    }

    #[test]
    fn test_private_use_and_noncharacters_rejected() {
        assert!(saslprep("x\u{E000}").is_err());
        assert!(saslprep("x\u{FFFF}").is_err());
        assert!(saslprep("x\u{1FFFE}").is_err());
    }

    #[test]
    fn test_unicode_letters_kept() {
        assert_eq!(saslprep("p\u{00E4}ssw\u{00F6}rd").unwrap(), "p\u{00E4}ssw\u{00F6}rd");
    }
}
