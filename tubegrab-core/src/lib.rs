//! Download orchestration for tubegrab: format discovery, a bounded worker
//! pool of cancellable download tasks and the event stream they report on.
//!
//! Everything that talks to the network goes through an
//! [`Engine`](crate::core::engine::Engine);
//! [`YtDlpEngine`](crate::core::ytdlp::YtDlpEngine) is the production one.

pub mod core;
pub mod error;
pub mod fs_paths;
pub mod models;

pub use crate::core::dispatcher::{Dispatcher, SearchHandle, TaskHandle};
pub use crate::core::events::{ChannelEmitter, DownloadProgress, Event, EventEmitter, TaskId};
pub use crate::core::task::DownloadSpec;
pub use crate::models::media::{EncodingDescriptor, FormatCatalog, MediaMetadata};
pub use crate::models::settings::AppSettings;
