pub mod tick;
pub mod symbol_stats;

pub use tick::{ParseSideError, Tick, TickSide};
pub use symbol_stats::SymbolStats;
