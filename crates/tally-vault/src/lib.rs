//! # tally-vault
//!
//! Filesystem side of tally: a vault is a directory of markdown notes.
//!
//! - [`Vault`]: scanning, reading notes, applying watcher events and
//!   draining the recount queue against disk
//! - [`VaultWatcher`]: `notify`-based change feed ([`VaultEvent`])
//! - [`StateStore`]: JSON persistence under `.tally/`
//! - [`VaultLinkResolver`]: outbound links of notes on disk

pub mod links;
pub mod store;
pub mod vault;
pub mod watcher;

pub use links::VaultLinkResolver;
pub use store::{config_path, LoadedState, StateStore, STATE_DIR};
pub use vault::{ScanReport, Vault};
pub use watcher::{is_note, VaultEvent, VaultWatcher};
