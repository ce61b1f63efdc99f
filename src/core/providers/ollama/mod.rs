//! Ollama local-model backend adapter

mod client;
mod config;
mod provider;
mod streaming;

pub use config::OllamaConfig;
pub use provider::OllamaProvider;

pub(crate) const NAME: &str = "ollama";
