//! Configuration and tool entry points that sit on top of the indexing pipeline.

pub mod config;
pub mod tools;

pub use config::Config;
pub use tools::{ToolContext, ToolDef, ToolOutput, call_tool, tool_definitions};
