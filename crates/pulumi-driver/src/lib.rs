//! `pulumi-driver` — runs stack operations through the `pulumi` CLI.
//!
//! Implements [`stackfleet_core::StackProvider`] by spawning one `pulumi`
//! subprocess per operation, so the fleet never links the Pulumi SDK.
//!
//! # Architecture
//!
//! ```text
//! PulumiWorkspace   ← StackProvider impl; resolves the executable once
//!     │
//!     ▼
//! Invocation        ← subcommand + `--stack <name> --non-interactive`
//!                     + `-- <operands>`
//!     │
//!     ▼
//! PulumiProcess     ← spawns the child, streams stdout lines,
//!                     drains stderr for error messages
//! ```
//!
//! stdout of `up` and `destroy` is forwarded line by line to the caller's
//! [`stackfleet_core::ProgressSink`]; `stack output --json` is captured and
//! parsed with [`parse_outputs`].

pub mod error;
pub mod types;
pub mod workspace;

pub(crate) mod process;


pub use error::PulumiError;
pub use types::{parse_outputs, Invocation, Operation, WorkspaceOptions};
pub use workspace::PulumiWorkspace;

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, PulumiError>;
