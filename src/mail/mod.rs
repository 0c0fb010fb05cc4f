pub mod action;
pub mod types;

pub use action::{ActionKind, EffectClass};
pub use types::{CollectionKey, EmailFlags, EmailSummary, Folder};
