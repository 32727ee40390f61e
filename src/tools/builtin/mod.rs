//! Built-in tools backing the local Tool Adapter.

mod glob;
mod grep;
mod list_directory;
mod read_file;
mod run_command;
mod tree;
mod write_file;

pub use glob::GlobTool;
pub use grep::GrepTool;
pub use list_directory::ListDirectoryTool;
pub use read_file::ReadFileTool;
pub use run_command::RunCommandTool;
pub use tree::TreeTool;
pub use write_file::WriteFileTool;
