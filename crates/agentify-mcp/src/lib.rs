//! MCP tool servers for the chat backend: descriptors, live connections and
//! the merged tool catalog.

pub mod catalog;
pub mod client;
pub mod connector;
pub mod error;
pub mod registry;
pub mod session;

pub use catalog::{CatalogEntry, ToolCatalog};
pub use client::MCPClient;
pub use connector::{
    ConnectionState, ConnectorStatus, ConnectorTimeouts, ServerConnectionInfo, StatusReport,
    ToolServerConnector,
};
pub use error::{McpError, Result};
pub use registry::ToolServerRegistry;
pub use session::{RmcpSessionFactory, SessionFactory, ToolInfo, ToolOutput, ToolSession};
