//! Entry kinds and categories
//!
//! A *kind* is the user-facing classification of an entry (`insight`,
//! `contact`, `session`, ...) and doubles as the directory name on disk. The
//! coarse *category* drives retrieval policy: knowledge and entities never
//! decay, events decay with age; entities mutate only via identity-key upsert.

use serde::{Deserialize, Serialize};

/// Coarse classification derived from an entry's kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Knowledge,
    Entity,
    Event,
}

impl Category {
    /// Directory name under the vault root.
    pub fn dir(&self) -> &'static str {
        match self {
            Category::Knowledge => "knowledge",
            Category::Entity => "entities",
            Category::Event => "events",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Knowledge => "knowledge",
            Category::Entity => "entity",
            Category::Event => "event",
        }
    }

    /// All categories, in vault directory order.
    pub fn all() -> [Category; 3] {
        [Category::Knowledge, Category::Entity, Category::Event]
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "knowledge" => Ok(Category::Knowledge),
            "entity" => Ok(Category::Entity),
            "event" => Ok(Category::Event),
            other => Err(format!("unknown category '{other}'")),
        }
    }
}

/// Check a kind token against the kind grammar: `[a-z][a-z0-9_-]*`.
pub fn is_valid_kind(kind: &str) -> bool {
    let mut chars = kind.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// Map a kind to its category.
///
/// The table is fixed; kinds outside it are treated as knowledge.
pub fn category_for(kind: &str) -> Category {
    match kind {
        "insight" | "decision" | "pattern" | "note" | "document" | "reference" | "prompt" => {
            Category::Knowledge
        }
        "contact" | "project" | "tool" | "source" | "bucket" => Category::Entity,
        "conversation" | "message" | "session" | "task" | "log" | "feedback" => Category::Event,
        _ => Category::Knowledge,
    }
}
