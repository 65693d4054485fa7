//! Shell command gatekeeper for autonomous coding-agent harnesses.
//!
//! - [`security`]: allow/block decisions for shell commands
//! - [`permissions`]: file-tool scope confined to one project directory
//! - [`settings`]: per-project settings file for the agent API client
//! - [`audit`]: append-only decision log

pub mod audit;
pub mod permissions;
pub mod security;
pub mod settings;
