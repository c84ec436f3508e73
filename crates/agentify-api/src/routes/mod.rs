pub mod auth;
pub mod chat;
pub mod health;
pub mod llm;
pub mod mcp;
pub mod threads;
