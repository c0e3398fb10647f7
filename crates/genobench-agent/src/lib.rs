//! genobench agent invokers
//!
//! Concrete [`AgentInvoker`](genobench_core::AgentInvoker) implementations:
//! - [`CommandInvoker`] runs an agent as a subprocess speaking JSON over stdio
//! - [`ChatInvoker`] asks an OpenAI-compatible chat completions endpoint

pub mod chat;
pub mod command;
pub mod error;

pub use chat::{ChatConfig, ChatInvoker};
pub use command::{CommandInvoker, EX_TEMPFAIL};
pub use error::AgentError;
