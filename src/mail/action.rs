//! Closed set of list actions and their static semantics.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::EmailFlags;

/// How an action changes the displayed collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectClass {
    /// Update a flag on matching items, keep them in place
    Toggle,
    /// Filter matching items out of the displayed collection
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Delete,
    Archive,
    Unarchive,
    Star,
    Unstar,
    Restore,
    MarkRead,
    MarkUnread,
}

impl ActionKind {
    pub const ALL: [ActionKind; 8] = [
        Self::Delete,
        Self::Archive,
        Self::Unarchive,
        Self::Star,
        Self::Unstar,
        Self::Restore,
        Self::MarkRead,
        Self::MarkUnread,
    ];

    pub fn effect_class(self) -> EffectClass {
        match self {
            Self::Delete | Self::Archive | Self::Unarchive | Self::Restore => EffectClass::Remove,
            Self::Star | Self::Unstar | Self::MarkRead | Self::MarkUnread => EffectClass::Toggle,
        }
    }

    pub fn is_undoable(self) -> bool {
        self.inverse().is_some()
    }

    /// Semantic inverse, defined only for undoable kinds
    pub fn inverse(self) -> Option<ActionKind> {
        match self {
            Self::Delete => Some(Self::Restore),
            Self::Restore => Some(Self::Delete),
            Self::Archive => Some(Self::Unarchive),
            Self::Unarchive => Some(Self::Archive),
            Self::Star => Some(Self::Unstar),
            Self::Unstar => Some(Self::Star),
            Self::MarkRead | Self::MarkUnread => None,
        }
    }

    /// The flag this action touches and whether it ends up set
    pub fn flag_change(self) -> (EmailFlags, bool) {
        match self {
            Self::Delete => (EmailFlags::DELETED, true),
            Self::Restore => (EmailFlags::DELETED, false),
            Self::Archive => (EmailFlags::ARCHIVED, true),
            Self::Unarchive => (EmailFlags::ARCHIVED, false),
            Self::Star => (EmailFlags::FLAGGED, true),
            Self::Unstar => (EmailFlags::FLAGGED, false),
            Self::MarkRead => (EmailFlags::SEEN, true),
            Self::MarkUnread => (EmailFlags::SEEN, false),
        }
    }

    /// Flags after applying this action to `flags`
    pub fn apply(self, flags: EmailFlags) -> EmailFlags {
        let (flag, set) = self.flag_change();
        let mut updated = flags;
        updated.set(flag, set);
        updated
    }

    /// Past-tense label for status messages
    pub fn label(self) -> &'static str {
        match self {
            Self::Delete => "Deleted",
            Self::Archive => "Archived",
            Self::Unarchive => "Moved to inbox",
            Self::Star => "Starred",
            Self::Unstar => "Unstarred",
            Self::Restore => "Restored",
            Self::MarkRead => "Marked read",
            Self::MarkUnread => "Marked unread",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Delete => "DELETE",
            Self::Archive => "ARCHIVE",
            Self::Unarchive => "UNARCHIVE",
            Self::Star => "STAR",
            Self::Unstar => "UNSTAR",
            Self::Restore => "RESTORE",
            Self::MarkRead => "MARK_READ",
            Self::MarkUnread => "MARK_UNREAD",
        };
        f.write_str(name)
    }
}
