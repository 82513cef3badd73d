//! Token Estimation
//!
//! Coarse character-based token counting used for admission decisions and
//! as a fallback for usage reporting when the endpoint omits token counts.
//!
//! The estimate is `ceil(chars / 4)`. It is not accurate for any particular
//! tokenizer; it only needs to grow monotonically with input length.

/// Characters assumed per token
pub const CHARS_PER_TOKEN: u64 = 4;

/// Estimate the token count of `text`
#[inline]
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(CHARS_PER_TOKEN)
}

/// Estimate tokens for a prompt and the completion produced for it
pub fn estimate_exchange(prompt: &str, completion: &str) -> (u64, u64) {
    (estimate_tokens(prompt), estimate_tokens(completion))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_estimate_empty() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_estimate_rounds_up() {
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_estimate_counts_chars_not_bytes() {
        // 5 chars, 15 bytes
        assert_eq!(estimate_tokens("안녕하세요"), 2);
    }

    #[test]
    fn test_estimate_exchange() {
        assert_eq!(estimate_exchange("12345678", "123"), (2, 1));
    }

    proptest! {
        #[test]
        fn prop_estimate_monotonic(a in ".{0,200}", b in ".{0,200}") {
            let joined = format!("{a}{b}");
            prop_assert!(estimate_tokens(&joined) >= estimate_tokens(&a));
        }
    }
}
