pub mod artifacts;
pub mod catalog;
pub mod dependencies;
pub mod dispatcher;
pub mod engine;
pub mod events;
pub mod filename;
pub mod process;
pub mod progress;
pub mod registry;
pub mod search;
pub mod task;
pub mod ytdlp;

#[cfg(test)]
pub(crate) mod test_support;
