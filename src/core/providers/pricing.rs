//! Static per-adapter price tables

use tracing::warn;

use crate::core::types::response::{CostEstimate, TokenUsage};

/// Per-million-token prices for one model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRow {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl PriceRow {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub const fn free() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Price table keyed by model id with a `default` fallback row
#[derive(Debug, Clone)]
pub struct PriceTable {
    rows: Vec<(&'static str, PriceRow)>,
    default_row: PriceRow,
}

impl PriceTable {
    pub fn new(rows: Vec<(&'static str, PriceRow)>, default_row: PriceRow) -> Self {
        Self { rows, default_row }
    }

    /// Table for backends that bill nothing (local models).
    pub fn free() -> Self {
        Self::new(Vec::new(), PriceRow::free())
    }

    pub fn row_for(&self, model: &str) -> PriceRow {
        match self.rows.iter().find(|(id, _)| *id == model) {
            Some((_, row)) => *row,
            None => {
                if !self.rows.is_empty() {
                    warn!(model, "no pricing entry for model, using default row");
                }
                self.default_row
            }
        }
    }

    pub fn cost(&self, usage: &TokenUsage, model: &str) -> CostEstimate {
        let row = self.row_for(model);
        let input_cost = (usage.input_tokens as f64 / 1_000_000.0) * row.input_per_million;
        let output_cost = (usage.output_tokens as f64 / 1_000_000.0) * row.output_per_million;
        CostEstimate::from_parts(input_cost, output_cost)
    }
}
