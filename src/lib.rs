//! Workspace placeholder crate.
//!
//! Exposes feature flags that map onto the workspace crates (`core-service`,
//! `core-playback`, `core-funnel`). Hosts depend on `release-funnel-workspace`
//! and enable the features they need instead of wiring each crate by hand.
