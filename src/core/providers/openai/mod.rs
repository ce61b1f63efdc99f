//! OpenAI backend adapter

mod client;
mod config;
mod provider;
mod streaming;

pub use config::OpenAIConfig;
pub use provider::OpenAIProvider;

use super::pricing::{PriceRow, PriceTable};

pub(crate) const NAME: &str = "openai";

/// Per-million-token prices; the default row mirrors the gpt-4o tier.
pub(crate) fn price_table() -> PriceTable {
    PriceTable::new(
        vec![
            ("gpt-4.1", PriceRow::new(2.0, 8.0)),
            ("gpt-4.1-mini", PriceRow::new(0.4, 1.6)),
            ("gpt-4.1-nano", PriceRow::new(0.1, 0.4)),
            ("o3", PriceRow::new(10.0, 40.0)),
            ("o4-mini", PriceRow::new(1.1, 4.4)),
            ("gpt-4o", PriceRow::new(5.0, 20.0)),
            ("gpt-4o-mini", PriceRow::new(0.6, 2.4)),
            ("gpt-4-turbo", PriceRow::new(10.0, 30.0)),
            ("gpt-4", PriceRow::new(30.0, 60.0)),
            ("gpt-3.5-turbo", PriceRow::new(0.5, 1.5)),
        ],
        PriceRow::new(5.0, 20.0),
    )
}
