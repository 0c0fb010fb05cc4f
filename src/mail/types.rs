use std::fmt;

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

bitflags! {
    /// Per-item flags mutated by list actions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct EmailFlags: u32 {
        const SEEN = 0b00000001;
        const FLAGGED = 0b00000010;
        const ARCHIVED = 0b00000100;
        const DELETED = 0b00001000;
    }
}

/// One row of a mail list. Only `id`, `flags` and `date` are interpreted by
/// this crate; the display fields are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSummary {
    pub id: String,
    pub flags: EmailFlags,
    /// Unix timestamp (seconds) used for default ordering
    pub date: i64,
    pub subject: String,
    pub from_addr: String,
    pub from_name: Option<String>,
    pub preview: Option<String>,
    pub has_attachments: bool,
}

impl EmailSummary {
    pub fn new(id: impl Into<String>, date: i64) -> Self {
        Self {
            id: id.into(),
            flags: EmailFlags::empty(),
            date,
            subject: String::new(),
            from_addr: String::new(),
            from_name: None,
            preview: None,
            has_attachments: false,
        }
    }

    pub fn with_flags(mut self, flags: EmailFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn is_read(&self) -> bool {
        self.flags.contains(EmailFlags::SEEN)
    }

    pub fn is_starred(&self) -> bool {
        self.flags.contains(EmailFlags::FLAGGED)
    }

    pub fn is_archived(&self) -> bool {
        self.flags.contains(EmailFlags::ARCHIVED)
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(EmailFlags::DELETED)
    }

    pub fn display_from(&self) -> &str {
        self.from_name.as_deref().unwrap_or(&self.from_addr)
    }

    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.date, 0)
    }
}

/// A list view over an account's mail. Membership is decided by flags, so
/// the same item can move between folders as actions are applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Folder {
    Inbox,
    Starred,
    Archive,
    Trash,
    /// User label; shows everything not archived or trashed
    Custom(String),
}

impl Folder {
    /// Whether an item with these flags belongs to this folder
    pub fn contains(&self, flags: EmailFlags) -> bool {
        let deleted = flags.contains(EmailFlags::DELETED);
        let archived = flags.contains(EmailFlags::ARCHIVED);
        match self {
            Self::Inbox | Self::Custom(_) => !deleted && !archived,
            Self::Starred => !deleted && flags.contains(EmailFlags::FLAGGED),
            Self::Archive => !deleted && archived,
            Self::Trash => deleted,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Inbox => "inbox",
            Self::Starred => "starred",
            Self::Archive => "archive",
            Self::Trash => "trash",
            Self::Custom(name) => name,
        }
    }
}

/// Identity of a displayed collection. Changing it resets the list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionKey {
    pub account: String,
    pub folder: Folder,
}

impl CollectionKey {
    pub fn new(account: impl Into<String>, folder: Folder) -> Self {
        Self {
            account: account.into(),
            folder,
        }
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.folder.name(), self.account)
    }
}
