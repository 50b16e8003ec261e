//! webtome: convert rendered web pages into reading-mode EPUB, Markdown,
//! DOCX, or PDF documents, with optional machine translation.

pub mod cli;
pub mod config;
pub mod emit;
pub mod extract;
pub mod fetch;
pub mod job;
pub mod model;
pub mod progress;
pub mod sanitize;
pub mod translate;

// Re-exports for CLI and consumers.
pub use emit::{emit, Document, EmitError, OutputFormat, StyleOptions};
pub use extract::extract;
pub use fetch::{
    FetchError, HttpClient, HttpClientBuilder, HttpPageFetcher, ImageFetcher, PageFetcher,
};
pub use job::{spawn_job, CancelToken, ConversionJob, JobError, JobHandle, JobOutput, JobState};
pub use model::{Block, ConversionRequest, Page, Source, TranslationResult};
pub use progress::{progress_channel, ProgressPublisher, ProgressSnapshot};
pub use sanitize::sanitize;
pub use translate::{
    Credentials, ProviderKind, TranslateError, TranslationEngine, TranslationProvider,
};
