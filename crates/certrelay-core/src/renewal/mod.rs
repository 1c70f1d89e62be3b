//! Certificate renewal.
//!
//! - [`tool`]: `RenewalTool` capability and the subprocess `CommandTool`
//! - [`invoker`]: `RenewalInvoker`, one tool call plus the on-disk poll

pub mod invoker;
pub mod tool;

pub use invoker::{PollConfig, RenewalInvoker};
pub use tool::{CommandTool, RenewalTool, ToolOutput, DEFAULT_TOOL_TIMEOUT, DOMAIN_PLACEHOLDER};
