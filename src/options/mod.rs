//! Option contract data model and the two deterministic selector variants (C9).

pub mod hedging_selector;
pub mod models;
pub mod selector;

pub use hedging_selector::{
    select_hedge_contract, CandidateContract, DteRules, HedgeSelection, HedgeSelectionRules,
    LiquidityMetrics,
};
pub use models::{OptionContract, OptionRight, QuoteMetrics, SelectedOptionContract};
pub use selector::select_scalper_contract;
