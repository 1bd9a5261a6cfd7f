//! Pastoral memory type definitions.
//!
//! Defines [`Theme`] (the closed vocabulary of ten labels), [`ThemeWindow`]
//! (a bounded, insertion-ordered set of themes), and [`PastoralMemory`] (the
//! per-user record as persisted in `pastoral_memory`).

use serde::{Deserialize, Serialize};

/// Maximum number of themes remembered per user.
pub const THEME_CAPACITY: usize = 3;

/// An emotional or spiritual topic detected in user text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Fear,
    Trust,
    Forgiveness,
    Grief,
    Hope,
    Suffering,
    Joy,
    Love,
    Mercy,
    Healing,
}

impl Theme {
    /// Every label in vocabulary order.
    pub const ALL: [Theme; 10] = [
        Theme::Fear,
        Theme::Trust,
        Theme::Forgiveness,
        Theme::Grief,
        Theme::Hope,
        Theme::Suffering,
        Theme::Joy,
        Theme::Love,
        Theme::Mercy,
        Theme::Healing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fear => "fear",
            Self::Trust => "trust",
            Self::Forgiveness => "forgiveness",
            Self::Grief => "grief",
            Self::Hope => "hope",
            Self::Suffering => "suffering",
            Self::Joy => "joy",
            Self::Love => "love",
            Self::Mercy => "mercy",
            Self::Healing => "healing",
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Theme {
    type Err = String;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_ascii_lowercase();
        Theme::ALL
            .into_iter()
            .find(|t| t.as_str() == label)
            .ok_or_else(|| format!("unknown theme: {s}"))
    }
}

/// Ordered set of at most [`THEME_CAPACITY`] themes.
///
/// Acts as a set (no duplicates) and a queue (oldest first). Pushing a theme
/// that is already present leaves the window untouched; pushing a new theme
/// onto a full window evicts the oldest entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Theme>", into = "Vec<Theme>")]
pub struct ThemeWindow {
    themes: Vec<Theme>,
}

impl ThemeWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, theme: Theme) -> bool {
        self.themes.contains(&theme)
    }

    /// Append `theme` unless present, then drop from the front past capacity.
    /// Returns `true` if the window changed.
    pub fn push(&mut self, theme: Theme) -> bool {
        if self.contains(theme) {
            return false;
        }
        self.themes.push(theme);
        self.truncate_front(THEME_CAPACITY);
        true
    }

    /// Merge a batch in order. Returns `true` if anything changed.
    pub fn merge(&mut self, themes: impl IntoIterator<Item = Theme>) -> bool {
        let mut changed = false;
        for theme in themes {
            changed |= self.push(theme);
        }
        changed
    }

    /// Keep only the newest `len` themes.
    pub fn truncate_front(&mut self, len: usize) {
        if self.themes.len() > len {
            let excess = self.themes.len() - len;
            self.themes.drain(..excess);
        }
    }

    pub fn clear(&mut self) {
        self.themes.clear();
    }

    pub fn len(&self) -> usize {
        self.themes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.themes.is_empty()
    }

    pub fn as_slice(&self) -> &[Theme] {
        &self.themes
    }

    pub fn iter(&self) -> impl Iterator<Item = Theme> + '_ {
        self.themes.iter().copied()
    }
}

impl TryFrom<Vec<Theme>> for ThemeWindow {
    type Error = String;

    /// Rebuilds through [`ThemeWindow::merge`], so stored rows that somehow
    /// violate the invariants are normalized rather than rejected.
    fn try_from(themes: Vec<Theme>) -> Result<Self, Self::Error> {
        let mut window = ThemeWindow::new();
        window.merge(themes);
        Ok(window)
    }
}

impl From<ThemeWindow> for Vec<Theme> {
    fn from(window: ThemeWindow) -> Self {
        window.themes
    }
}

/// A user's pastoral memory, matching the `pastoral_memory` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PastoralMemory {
    pub user_id: String,
    pub themes: ThemeWindow,
    /// RFC 3339 timestamp of the last merge or reset.
    pub updated_at: String,
    /// Row version for optimistic conflict detection; 0 for a record not yet stored.
    #[serde(default)]
    pub version: i64,
}

impl PastoralMemory {
    /// A fresh, unsaved record with no themes.
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            themes: ThemeWindow::new(),
            updated_at: String::new(),
            version: 0,
        }
    }
}
