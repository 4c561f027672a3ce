//! Tool handlers and the per-session tool invocation executor

mod call;
mod executor;
mod registry;

pub use call::{parse_arguments, ToolCall};
pub(crate) use executor::execution_error;
pub use executor::{Admission, Execution, Outcome, ToolExecutor};
pub use registry::{parse_params, ToolContext, ToolHandler, ToolRegistry, ToolResult};
