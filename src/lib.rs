//! Receive push notifications and mirror the pushed repository onto local directories.
//!
//! ## How it works
//!
//! `deploy-hook` is built up from **triggers**, a **coordinator** and the **sync engine**.
//! Triggers receive the notifications (for example over HTTP) and pass them on one by one.
//! The coordinator parses the notification and hands every commit to the sync engine,
//! which mirrors the branch of the commit to its destination directory.
//!
//! ```ignore
//! +---------+       +-------------+       +-------------+       +-----------+
//! | trigger | ----> | coordinator | ----> | sync engine | ----> | directory |
//! +---------+       +-------------+       +-------------+       +-----------+
//!                                                |
//!                                          remote source
//! ```
//!
//! The first commit on a branch downloads the whole tree of its revision. After that,
//! a deploy marker is left in the directory, and the next commits only download (or remove)
//! the files they changed.
//!

/// The configuration of the destinations and the remote.
pub mod config;
/// The coordinator, deploying one notification at a time.
pub mod deploy;
/// Mapping repository paths to the destination directories.
pub mod paths;
/// Parsing the push notifications.
pub mod payload;
/// Reading revisions from the hosting API.
pub mod remote;
/// The main program loop, that deploys every notification from the triggers.
pub mod start;
/// The deploy markers and the destination locks.
pub mod state;
/// Applying commits to destination directories with full or incremental syncs.
pub mod sync;
/// A trigger is a long running background process, which receives the notifications
/// (e.g. [over HTTP](triggers::http::HttpTrigger) or [from a file](triggers::once::OnceTrigger)).
pub mod triggers;
