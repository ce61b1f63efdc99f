//! Anthropic (Claude) backend adapter

mod client;
mod config;
mod provider;
mod streaming;

pub use config::AnthropicConfig;
pub use provider::AnthropicProvider;

use super::pricing::{PriceRow, PriceTable};

pub(crate) const NAME: &str = "anthropic";

/// Per-million-token prices; the default row mirrors the sonnet tier.
pub(crate) fn price_table() -> PriceTable {
    PriceTable::new(
        vec![
            ("claude-3-7-sonnet-20250219", PriceRow::new(3.0, 15.0)),
            ("claude-3-5-sonnet-20240620", PriceRow::new(3.0, 15.0)),
            ("claude-3-5-haiku-20240620", PriceRow::new(0.80, 4.0)),
            ("claude-3-opus-20240229", PriceRow::new(15.0, 75.0)),
            ("claude-3-sonnet-20240229", PriceRow::new(3.0, 15.0)),
            ("claude-3-haiku-20240307", PriceRow::new(0.25, 1.25)),
        ],
        PriceRow::new(3.0, 15.0),
    )
}
