pub mod cache;
pub mod clock;

pub use cache::{QuoteOrigin, QuoteSet, RefreshCache};
pub use clock::{Clock, ManualClock, SystemClock};
