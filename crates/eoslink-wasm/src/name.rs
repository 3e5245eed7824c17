//! EOSIO identifier encodings.
//!
//! Account and action names are 64-bit base32 values: up to 12 characters
//! drawn from `.12345a-z` at 5 bits each, packed from the high bit down,
//! plus an optional 13th character restricted to 4 bits. Sync-call function
//! names use a separate hash id keyed off the call name string.

/// Map one name character to its 5-bit symbol value.
fn char_to_symbol(c: u8) -> u64 {
    match c {
        b'a'..=b'z' => (c - b'a') as u64 + 6,
        b'1'..=b'5' => (c - b'1') as u64 + 1,
        _ => 0,
    }
}

/// Encode a dot-separated identifier string as a 64-bit EOSIO name.
///
/// Characters beyond the 13th are ignored, as are characters outside the
/// name alphabet (they encode as `.`, value 0).
pub fn string_to_name(s: &str) -> u64 {
    let bytes = s.as_bytes();
    let mut name = 0u64;
    for i in 0..=12usize {
        let mut c = if i < bytes.len() {
            char_to_symbol(bytes[i])
        } else {
            0
        };
        if i < 12 {
            c &= 0x1f;
            name |= c << (64 - 5 * (i + 1));
        } else {
            name |= c & 0x0f;
        }
    }
    name
}

/// Hash id used by the sync-call dispatcher to match a called function
/// name against a compile-time-known call name.
pub fn sync_call_id(name: &str) -> u64 {
    crc32fast::hash(name.as_bytes()) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_known_names() {
        assert_eq!(string_to_name("eosio"), 0x5530ea0000000000);
        assert_eq!(string_to_name("transfer"), 0xcdcd3c2d57000000);
        assert_eq!(string_to_name("onerror"), 0xa4d57bd2e0000000);
    }

    #[test]
    fn empty_and_dot_are_zero() {
        assert_eq!(string_to_name(""), 0);
        assert_eq!(string_to_name("."), 0);
        assert_eq!(string_to_name("..."), 0);
    }

    #[test]
    fn single_letter() {
        // 'a' encodes as symbol 6 in the top five bits
        assert_eq!(string_to_name("a"), 6u64 << 59);
    }

    #[test]
    fn thirteenth_char_uses_low_nibble() {
        let twelve = string_to_name("aaaaaaaaaaaa");
        let thirteen = string_to_name("aaaaaaaaaaaaa");
        assert_eq!(thirteen & !0xf, twelve & !0xf);
        assert_eq!(thirteen & 0xf, 6);
    }

    #[test]
    fn digits_map_low() {
        // '1' is symbol 1
        assert_eq!(string_to_name("1"), 1u64 << 59);
        assert_eq!(string_to_name("5"), 5u64 << 59);
    }

    #[test]
    fn sync_call_id_is_stable() {
        assert_eq!(sync_call_id("hello"), sync_call_id("hello"));
        assert_ne!(sync_call_id("hello"), sync_call_id("world"));
        // ids fit in 32 bits by construction
        assert!(sync_call_id("anyname") <= u32::MAX as u64);
    }
}
