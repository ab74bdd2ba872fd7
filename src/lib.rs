//! Prebake: CI driver for a package recipe index.
//!
//! Selects target platforms, works out which recipes changed, builds the
//! index's prebuilt tools on every capable platform, and reports health
//! transitions to a chat channel.

pub mod cli;
pub mod core;
pub mod pkgmgr;
pub mod report;
pub mod transport;
pub mod vcs;
