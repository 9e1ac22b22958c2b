//! Sensitive value masking
//!
//! Replaces every match of the configured patterns with a fixed token.
//! Masking is irreversible and idempotent: the replacement tokens do not
//! themselves match any pattern, so re-masking a masked string is a no-op.

use crate::policy::MaskPolicy;

/// Regex-based masker over the policy's ordered pattern list.
pub struct SensitivePatternMasker<'a> {
    policy: &'a MaskPolicy,
}

impl<'a> SensitivePatternMasker<'a> {
    pub fn new(policy: &'a MaskPolicy) -> Self {
        Self { policy }
    }

    /// Mask every non-overlapping match of every pattern, in policy order.
    pub fn mask(&self, text: &str) -> String {
        let mut masked = text.to_string();
        for pattern in &self.policy.patterns {
            if pattern.regex.is_match(&masked) {
                masked = pattern
                    .regex
                    .replace_all(&masked, pattern.replacement.as_str())
                    .into_owned();
            }
        }
        masked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn masker_policy() -> MaskPolicy {
        MaskPolicy::defaults()
    }

    #[test]
    fn test_masks_email_addresses() {
        let policy = masker_policy();
        let masker = SensitivePatternMasker::new(&policy);
        assert_eq!(
            masker.mask("contact jane@example.com for details"),
            "contact [REDACTED:email] for details"
        );
    }

    #[test]
    fn test_masks_card_before_digit_runs() {
        let policy = masker_policy();
        let masker = SensitivePatternMasker::new(&policy);
        // 16 digits with separators must become one credit_card token, not
        // be chewed up by the phone pattern.
        assert_eq!(
            masker.mask("card 4111-1111-1111-1111 on file"),
            "card [REDACTED:credit_card] on file"
        );
    }

    #[test]
    fn test_masks_ssn_and_phone() {
        let policy = masker_policy();
        let masker = SensitivePatternMasker::new(&policy);
        assert_eq!(masker.mask("ssn 123-45-6789"), "ssn [REDACTED:ssn]");
        assert_eq!(masker.mask("call 5551234567"), "call [REDACTED:phone]");
    }

    #[test]
    fn test_masks_multiple_matches() {
        let policy = masker_policy();
        let masker = SensitivePatternMasker::new(&policy);
        assert_eq!(
            masker.mask("a@b.co and c@d.org"),
            "[REDACTED:email] and [REDACTED:email]"
        );
    }

    #[test]
    fn test_masking_is_idempotent() {
        let policy = masker_policy();
        let masker = SensitivePatternMasker::new(&policy);
        let samples = [
            "jane@example.com",
            "4111 1111 1111 1111 / 123-45-6789",
            "server at 10.0.0.1, IBAN GB29NWBK60161331926819",
            "nothing sensitive here",
            "",
        ];
        for sample in samples {
            let once = masker.mask(sample);
            let twice = masker.mask(&once);
            assert_eq!(once, twice, "masking must be idempotent for {:?}", sample);
        }
    }

    #[test]
    fn test_leaves_plain_text_alone() {
        let policy = masker_policy();
        let masker = SensitivePatternMasker::new(&policy);
        let text = "42 rows for the quarterly report";
        assert_eq!(masker.mask(text), text);
    }
}
