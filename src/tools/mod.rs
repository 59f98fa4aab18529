//! 工具层：调用方抽象、进程内注册表与内建工具

pub mod echo;
pub mod executor;
pub mod invoker;
pub mod registry;

pub use echo::EchoTool;
pub use executor::RegistryInvoker;
pub use invoker::{ToolInvoker, ToolSpec};
pub use registry::{Tool, ToolRegistry};
