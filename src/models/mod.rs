pub mod market;

pub use market::{AssetQuote, HistoryEntry};
