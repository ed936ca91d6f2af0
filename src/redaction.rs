/// Privacy redaction.
///
/// Scrubs personally identifying fragments from archived payloads. The
/// redactor itself is pure text-in, text-out; the archive owns the part
/// that keeps the hash chain verifiable after the mutation (see
/// [`crate::archive`]).
///
/// Built-in patterns cover email addresses, phone numbers, long digit
/// runs (account/card numbers), and street addresses. Deployments add
/// their own patterns at construction time.
use regex::Regex;

/// The token substituted for every flagged fragment.
pub const REDACTION_TOKEN: &str = "[REDACTED]";

/// Result of scrubbing one text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redaction {
    /// The scrubbed text
    pub text: String,
    /// Labels of the patterns that matched (never the matched PII itself)
    pub hits: Vec<String>,
}

impl Redaction {
    /// Whether any pattern matched.
    pub fn is_dirty(&self) -> bool {
        !self.hits.is_empty()
    }
}

/// A labeled PII pattern.
#[derive(Debug, Clone)]
struct PiiPattern {
    label: &'static str,
    regex: Regex,
}

/// Regex-driven PII scrubber.
#[derive(Debug, Clone)]
pub struct PrivacyRedactor {
    patterns: Vec<PiiPattern>,
}

impl PrivacyRedactor {
    /// Create a redactor with the built-in pattern set.
    pub fn new() -> Self {
        let patterns = vec![
            pattern("email", r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
            pattern(
                "phone",
                r"\+?\d{1,3}[-. (]*\d{3}[-. )]*\d{3}[-. ]*\d{4}\b",
            ),
            // Card/account numbers: 9+ digits, optionally dash/space grouped
            pattern("digit_run", r"\b\d(?:[\d -]{7,}\d)\b"),
            pattern(
                "street_address",
                r"(?i)\b\d{1,5}\s+[A-Za-z0-9. ]+\s(?:street|st|avenue|ave|road|rd|boulevard|blvd|lane|ln|drive|dr)\b\.?",
            ),
        ];

        Self { patterns }
    }

    /// Add a custom pattern. Invalid expressions are rejected by `regex`
    /// at construction, so a stored pattern always compiles.
    pub fn with_pattern(mut self, label: &'static str, expression: &str) -> Self {
        if let Ok(regex) = Regex::new(expression) {
            self.patterns.push(PiiPattern { label, regex });
        }
        self
    }

    /// Scrub all flagged fragments from `text`.
    ///
    /// Pure: the same input always yields the same output, and the hit
    /// list carries pattern labels only, never the matched content.
    pub fn redact_text(&self, text: &str) -> Redaction {
        let mut scrubbed = text.to_string();
        let mut hits = Vec::new();

        for p in &self.patterns {
            if p.regex.is_match(&scrubbed) {
                hits.push(p.label.to_string());
                scrubbed = p
                    .regex
                    .replace_all(&scrubbed, REDACTION_TOKEN)
                    .into_owned();
            }
        }

        Redaction {
            text: scrubbed,
            hits,
        }
    }
}

impl Default for PrivacyRedactor {
    fn default() -> Self {
        Self::new()
    }
}

fn pattern(label: &'static str, expression: &str) -> PiiPattern {
    PiiPattern {
        label,
        // Built-in expressions are compile-time constants; a failure here
        // is a programming error, not an input error.
        regex: Regex::new(expression).expect("built-in PII pattern must compile"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_email() {
        let redactor = PrivacyRedactor::new();
        let out = redactor.redact_text("reach me at alice@example.com please");

        assert!(!out.text.contains("alice@example.com"));
        assert!(out.text.contains(REDACTION_TOKEN));
        assert_eq!(out.hits, vec!["email"]);
    }

    #[test]
    fn test_redacts_phone_number() {
        let redactor = PrivacyRedactor::new();
        let out = redactor.redact_text("call 555-867-5309 tomorrow");

        assert!(!out.text.contains("867"));
        assert!(out.hits.iter().any(|h| h == "phone" || h == "digit_run"));
    }

    #[test]
    fn test_redacts_street_address() {
        let redactor = PrivacyRedactor::new();
        let out = redactor.redact_text("I live at 42 Elm Street now");

        assert!(!out.text.to_lowercase().contains("elm"));
        assert!(out.hits.contains(&"street_address".to_string()));
    }

    #[test]
    fn test_clean_text_untouched() {
        let redactor = PrivacyRedactor::new();
        let out = redactor.redact_text("we talked about career goals");

        assert_eq!(out.text, "we talked about career goals");
        assert!(!out.is_dirty());
    }

    #[test]
    fn test_custom_pattern() {
        let redactor = PrivacyRedactor::new().with_pattern("codename", r"Project \w+");
        let out = redactor.redact_text("ask about Project Bluebird");

        assert!(!out.text.contains("Bluebird"));
        assert!(out.hits.contains(&"codename".to_string()));
    }

    #[test]
    fn test_hits_carry_labels_not_content() {
        let redactor = PrivacyRedactor::new();
        let out = redactor.redact_text("bob@leaky.io");

        for hit in &out.hits {
            assert!(!hit.contains('@'), "hit label must not echo the PII");
        }
    }

    #[test]
    fn test_redaction_is_deterministic() {
        let redactor = PrivacyRedactor::new();
        let input = "alice@example.com and 555-867-5309";
        assert_eq!(redactor.redact_text(input), redactor.redact_text(input));
    }
}
