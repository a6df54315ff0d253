use rand::Rng;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// 9 random base-36 characters, used for callable-reference ids and message ids.
pub fn short_uid() -> String {
    random_base36(9)
}

/// `base36(timestamp)_base36(9 random chars)`, matching spec.md §6 Identifiers.
///
/// The timestamp is passed in by the caller rather than sampled here:
/// `forgeframe-protocol` has no browser clock, and on `wasm32-unknown-unknown`
/// the caller already has `js_sys::Date::now()` in hand.
pub fn instance_uid(timestamp_millis: u64) -> String {
    format!("{}_{}", to_base36(timestamp_millis), random_base36(9))
}

/// Validate the `^[a-z0-9]+_[a-z0-9]+$` shape spec.md requires of instance uids.
pub fn is_valid_instance_uid(uid: &str) -> bool {
    let Some((left, right)) = uid.split_once('_') else {
        return false;
    };
    !left.is_empty()
        && !right.is_empty()
        && !right.contains('_')
        && left.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        && right.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 alphabet is valid utf8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_uid_matches_shape() {
        let uid = instance_uid(1_700_000_000_000);
        assert!(is_valid_instance_uid(&uid), "uid {uid} did not match shape");
    }

    #[test]
    fn short_uid_is_nine_chars() {
        assert_eq!(short_uid().len(), 9);
    }

    #[test]
    fn rejects_malformed_uids() {
        assert!(!is_valid_instance_uid("noUnderscore"));
        assert!(!is_valid_instance_uid("_leadingunderscore"));
        assert!(!is_valid_instance_uid("trailingunderscore_"));
        assert!(!is_valid_instance_uid("Has-Upper_case"));
    }
}
