use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap()
});
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}").unwrap()
});
static SSN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}[-.\s]?\d{2}[-.\s]?\d{4}\b").unwrap());
static CREDIT_CARD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d{4}[-.\s]?){3}\d{4}\b").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PiiKind {
    Email,
    Phone,
    Ssn,
    CreditCard,
}

impl PiiKind {
    /// Label used inside placeholders, e.g. `[EMAIL_1]`.
    pub fn label(&self) -> &'static str {
        match self {
            PiiKind::Email => "EMAIL",
            PiiKind::Phone => "PHONE",
            PiiKind::Ssn => "SSN",
            PiiKind::CreditCard => "CREDIT_CARD",
        }
    }
}

/// One detected span and the placeholder that replaced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiToken {
    pub kind: PiiKind,
    /// 1-based match number within its kind.
    pub index: usize,
    pub placeholder: String,
    pub original: String,
}

#[derive(Debug, Clone)]
pub struct Obfuscated {
    pub text: String,
    pub tokens: Vec<PiiToken>,
}

/// Detects and reversibly replaces PII spans.
///
/// Kinds are applied in a fixed order (email, phone, SSN, credit card); the
/// running text is mutated between kinds, so a later pattern never re-matches
/// inside an earlier placeholder.
pub struct Obfuscator {
    matchers: Vec<(PiiKind, &'static Regex)>,
}

impl Obfuscator {
    pub fn new() -> Self {
        Self {
            matchers: vec![
                (PiiKind::Email, &EMAIL_RE),
                (PiiKind::Phone, &PHONE_RE),
                (PiiKind::Ssn, &SSN_RE),
                (PiiKind::CreditCard, &CREDIT_CARD_RE),
            ],
        }
    }

    /// Replace every detected span with a `[<KIND>_<n>]` placeholder.
    ///
    /// Matches are replaced in reverse position order so earlier offsets stay
    /// valid while splicing; tokens are recorded in capture order.
    pub fn obfuscate(&self, text: &str) -> Obfuscated {
        let mut out = text.to_string();
        let mut tokens = Vec::new();

        for (kind, re) in &self.matchers {
            let spans: Vec<(usize, usize, String)> = re
                .find_iter(&out)
                .map(|m| (m.start(), m.end(), m.as_str().to_string()))
                .collect();
            if spans.is_empty() {
                continue;
            }

            let kind_tokens: Vec<PiiToken> = spans
                .iter()
                .enumerate()
                .map(|(i, (_, _, original))| PiiToken {
                    kind: *kind,
                    index: i + 1,
                    placeholder: format!("[{}_{}]", kind.label(), i + 1),
                    original: original.clone(),
                })
                .collect();

            for (token, (start, end, _)) in kind_tokens.iter().zip(&spans).rev() {
                out.replace_range(*start..*end, &token.placeholder);
            }
            tokens.extend(kind_tokens);
        }

        if !tokens.is_empty() {
            debug!(count = tokens.len(), "obfuscated PII spans");
        }
        Obfuscated { text: out, tokens }
    }

    /// Reverse the substitution: each token replaces the first occurrence of
    /// its placeholder. A text without placeholders passes through unchanged.
    pub fn deobfuscate(&self, text: &str, tokens: &[PiiToken]) -> String {
        let mut out = text.to_string();
        for token in tokens {
            out = out.replacen(&token.placeholder, &token.original, 1);
        }
        out
    }

    /// True iff any kind matches.
    pub fn contains_pii(&self, text: &str) -> bool {
        self.matchers.iter().any(|(_, re)| re.is_match(text))
    }
}

impl Default for Obfuscator {
    fn default() -> Self {
        Self::new()
    }
}
