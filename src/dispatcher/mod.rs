//! Server-side recognition dispatcher.
//!
//! Tasks arrive on a bounded queue from the connection layer and are consumed
//! by a single worker thread. Tasks whose connection is no longer live are
//! dropped without a result; everything else is segmented, recognized and
//! optionally punctuated before the outcome is published on the outbound queue.

pub mod error;
pub mod liveness;
pub mod readiness;
pub mod segmenter;
pub mod station;
pub mod worker;

pub use error::{ErrorReporter, LogReporter, StationError};
pub use liveness::LiveSet;
pub use readiness::PunctuationGate;
pub use segmenter::{Feed, FeedError, Segmenter};
pub use station::{RunnerOptions, Station, StationRunner};
pub use worker::{Dispatcher, PunctuatorLoader, RecognitionStation, RecognizerLoader};
