pub mod copy;
pub mod images;
pub mod orchestrator;
pub mod progress;
pub mod retry;

pub use images::{HttpImageFetcher, ImageFetcher};
pub use orchestrator::{EnrichmentReport, Enricher};
pub use progress::{ProgressEvent, ProgressStatus};
pub use retry::RetryPolicy;
