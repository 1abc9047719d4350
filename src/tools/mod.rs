//! MCP tool handlers for the feedback server

pub mod interactive_feedback;
