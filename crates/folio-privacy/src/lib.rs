//! Reversible PII obfuscation.
//!
//! Detected spans are swapped for unique-suffixed placeholders before a
//! prompt leaves the process; the per-request token table reverses the
//! substitution on the way back. The pattern list and its order are part of
//! the wire contract — placeholders produced by earlier kinds are visible to
//! later ones.

mod obfuscator;

pub use obfuscator::{Obfuscated, Obfuscator, PiiKind, PiiToken};
