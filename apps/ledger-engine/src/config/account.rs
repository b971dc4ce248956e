//! Account sizing and fee model configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Account configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Equity at engine start; the base for risk percentages.
    #[serde(default = "default_starting_equity")]
    pub starting_equity: Decimal,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            starting_equity: default_starting_equity(),
        }
    }
}

fn default_starting_equity() -> Decimal {
    Decimal::new(1_000_000, 0)
}
