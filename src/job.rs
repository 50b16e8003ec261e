//! Conversion jobs: the fetch -> sanitize -> extract -> translate -> emit
//! pipeline behind one worker thread per request, with cooperative
//! cancellation and per-job progress reporting.

use crate::emit::{self, EmitError, OutputFormat};
use crate::extract::extract;
use crate::fetch::{FetchError, ImageFetcher, PageFetcher};
use crate::model::{ConversionRequest, Page, Source};
use crate::progress::{progress_channel, ProgressPublisher, ProgressSnapshot};
use crate::sanitize::sanitize;
use crate::translate::{Credentials, TranslationEngine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;

const TRANSLATE_TIMEOUT_SECS: u64 = 60;

/// Pipeline stage a job is currently in. Forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Fetching,
    Sanitizing,
    Extracting,
    Translating,
    Emitting,
    Done,
    Failed,
}

/// Shared cancellation flag, checked between pages and before emit. Cheap to
/// clone; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Emit(#[from] EmitError),
    #[error("Job was cancelled")]
    Cancelled,
    #[error("Job worker failed: {0}")]
    Worker(String),
}

/// Finished document plus the filename it should be saved under.
#[derive(Debug)]
pub struct JobOutput {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

enum PageInput {
    Remote { url: String, title: String },
    Inline { title: String, html: String },
}

/// One conversion request bound to its fetchers. `run` consumes the job.
pub struct ConversionJob<F, I> {
    request: ConversionRequest,
    fetcher: F,
    images: I,
    credentials: Credentials,
    state: JobState,
}

impl<F: PageFetcher, I: ImageFetcher> ConversionJob<F, I> {
    pub fn new(
        request: ConversionRequest,
        fetcher: F,
        images: I,
        credentials: Credentials,
    ) -> Self {
        Self {
            request,
            fetcher,
            images,
            credentials,
            state: JobState::Pending,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Run the pipeline to completion. The fetcher session is closed exactly
    /// once, on every exit path, before the terminal progress snapshot.
    pub fn run(
        mut self,
        publisher: &mut ProgressPublisher,
        cancel: &CancelToken,
    ) -> Result<JobOutput, JobError> {
        let result = self.execute(publisher, cancel);
        self.fetcher.close();
        match &result {
            Ok(_) => {
                self.state = JobState::Done;
                publisher.finish();
            }
            Err(e) => {
                self.state = JobState::Failed;
                publisher.fail(&e.to_string());
            }
        }
        result
    }

    fn execute(
        &mut self,
        publisher: &mut ProgressPublisher,
        cancel: &CancelToken,
    ) -> Result<JobOutput, JobError> {
        let translating = self.request.provider.is_remote();
        if translating && self.request.target_lang.is_none() {
            return Err(JobError::InvalidRequest(
                "a remote translator requires a target language".to_string(),
            ));
        }
        let mut engine =
            TranslationEngine::new(self.request.provider, &self.credentials, TRANSLATE_TIMEOUT_SECS)
                .map_err(|e| JobError::InvalidRequest(e.to_string()))?;

        let inputs = self.collect_inputs(cancel)?;
        let total_units = inputs.len() as u32 * (1 + u32::from(translating)) + 1;
        publisher.begin(total_units);

        let multi_page = inputs.len() > 1;
        let mut pages: Vec<Page> = Vec::with_capacity(inputs.len());
        let mut first_fetch_error: Option<FetchError> = None;
        for input in inputs {
            if cancel.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            let (title, raw, base_url) = match input {
                PageInput::Remote { url, title } => {
                    self.state = JobState::Fetching;
                    let selector = self.content_selector();
                    match self.fetcher.fetch(&url, selector.as_deref()) {
                        Ok(raw) => (title, raw, url),
                        Err(e) if multi_page => {
                            // One bad page must not sink the batch.
                            eprintln!("Warning: skipping page {url}: {e}");
                            first_fetch_error.get_or_insert(e);
                            publisher.advance();
                            if translating {
                                publisher.advance();
                            }
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                PageInput::Inline { title, html } => (title, html, String::new()),
            };
            self.state = JobState::Sanitizing;
            let canonical = sanitize(&raw);
            self.state = JobState::Extracting;
            let blocks = extract(&canonical, &base_url);
            pages.push(Page {
                title,
                raw_content: raw,
                blocks,
            });
            publisher.advance();
        }
        if pages.is_empty() {
            return Err(match first_fetch_error {
                Some(e) => JobError::Fetch(e),
                None => JobError::InvalidRequest("no pages to convert".to_string()),
            });
        }

        if translating {
            // Validated above: remote providers require a target language.
            let target_lang = self.request.target_lang.clone().unwrap_or_default();
            self.state = JobState::Translating;
            for page in &mut pages {
                if cancel.is_cancelled() {
                    return Err(JobError::Cancelled);
                }
                page.blocks = engine.translate_blocks(&page.blocks, &target_lang);
                publisher.advance();
            }
        }

        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        self.state = JobState::Emitting;
        let document = emit::emit(
            self.request.format,
            &pages,
            &self.request.title,
            &self.request.style,
            &mut self.images,
            self.request.merge_pages,
        )?;
        publisher.advance();

        let file_name = format!(
            "{}.{}",
            emit::sanitize_file_stem(&self.request.title),
            document.extension
        );
        Ok(JobOutput {
            bytes: document.bytes,
            file_name,
        })
    }

    fn content_selector(&self) -> Option<String> {
        match &self.request.source {
            Source::Url {
                content_selector, ..
            } => content_selector.clone(),
            Source::Text { .. } => None,
        }
    }

    /// Resolve the source into a list of page inputs. Menu sources fetch the
    /// link list first; text sources split on blank lines.
    fn collect_inputs(&mut self, cancel: &CancelToken) -> Result<Vec<PageInput>, JobError> {
        match self.request.source.clone() {
            Source::Url {
                url,
                menu_selector: Some(menu_selector),
                ..
            } => {
                if cancel.is_cancelled() {
                    return Err(JobError::Cancelled);
                }
                self.state = JobState::Fetching;
                let links = self.fetcher.fetch_links(&url, &menu_selector)?;
                Ok(links
                    .into_iter()
                    .map(|link| {
                        let title = title_from_url(&link);
                        PageInput::Remote { url: link, title }
                    })
                    .collect())
            }
            Source::Url { url, .. } => Ok(vec![PageInput::Remote {
                title: self.request.title.clone(),
                url,
            }]),
            Source::Text { content } => {
                let inputs: Vec<PageInput> = content
                    .split("\n\n")
                    .map(str::trim)
                    .filter(|chunk| !chunk.is_empty())
                    .enumerate()
                    .map(|(i, chunk)| PageInput::Inline {
                        title: format!("Page {}", i + 1),
                        html: text_chunk_to_html(chunk),
                    })
                    .collect();
                if inputs.is_empty() {
                    return Err(JobError::InvalidRequest(
                        "text input contains no content".to_string(),
                    ));
                }
                Ok(inputs)
            }
        }
    }
}

/// Wrap raw text lines in paragraphs so the sanitizer sees markup.
fn text_chunk_to_html(chunk: &str) -> String {
    let mut html = String::new();
    for line in chunk.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        html.push_str("<p>");
        for c in line.chars() {
            match c {
                '&' => html.push_str("&amp;"),
                '<' => html.push_str("&lt;"),
                '>' => html.push_str("&gt;"),
                _ => html.push(c),
            }
        }
        html.push_str("</p>");
    }
    html
}

/// Readable title from a URL: last non-empty path segment, else the host.
pub fn title_from_url(url: &str) -> String {
    let parsed = match reqwest::Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => return "page".to_string(),
    };
    let segment = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| s.replace(['-', '_'], " "));
    match segment {
        Some(s) if !s.trim().is_empty() => s,
        _ => parsed.host_str().unwrap_or("page").to_string(),
    }
}

/// Running job: worker thread, cancellation flag, progress stream.
pub struct JobHandle {
    worker: JoinHandle<Result<JobOutput, JobError>>,
    cancel: CancelToken,
    progress: Receiver<ProgressSnapshot>,
}

impl JobHandle {
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn progress(&self) -> &Receiver<ProgressSnapshot> {
        &self.progress
    }

    /// Wait for the worker and return its result.
    pub fn join(self) -> Result<JobOutput, JobError> {
        self.worker
            .join()
            .unwrap_or_else(|_| Err(JobError::Worker("worker thread panicked".to_string())))
    }
}

/// Spawn a job on its own worker thread.
pub fn spawn_job<F, I>(
    request: ConversionRequest,
    fetcher: F,
    images: I,
    credentials: Credentials,
) -> JobHandle
where
    F: PageFetcher + Send + 'static,
    I: ImageFetcher + Send + 'static,
{
    let (mut publisher, progress) = progress_channel();
    let cancel = CancelToken::new();
    let token = cancel.clone();
    let worker = std::thread::spawn(move || {
        ConversionJob::new(request, fetcher, images, credentials).run(&mut publisher, &token)
    });
    JobHandle {
        worker,
        cancel,
        progress,
    }
}
