use std::fmt;

use serde::{Deserialize, Serialize};

/// Joins the two participants of a key. User ids never contain it.
pub const SEPARATOR: char = '_';

/// Canonical name of the two-party conversation between two users.
///
/// `ConversationKey::between(a, b) == ConversationKey::between(b, a)` for
/// every pair, so either participant finds the same messages and typing
/// record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn between(a: &str, b: &str) -> ConversationKey {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        ConversationKey(format!("{lo}{SEPARATOR}{hi}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ConversationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
