pub(crate) mod runnable;
pub mod time;

pub use time::{Clock, SystemClock, TokioClock};
