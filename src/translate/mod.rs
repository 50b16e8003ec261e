//! Optional machine translation of block text.
//!
//! Consecutive translatable units are joined into batches (bounded by
//! `MAX_BATCH_CHARS`) with a delimiter providers are told to preserve, then
//! split back. Any failure at batch or unit granularity falls back to the
//! original text; translation never fails a job.

pub mod provider;

use crate::model::{Block, TranslationResult};
use thiserror::Error;

/// Upper bound on the serialized size of one provider request, in characters.
pub const MAX_BATCH_CHARS: usize = 5000;

/// Joins units inside one batch. U+2042 (asterism) survives every provider
/// tested; a plain newline does not.
pub const BATCH_DELIMITER: &str = "\n\u{2042}\n";

/// Which translation backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// No translation; blocks pass through untouched.
    None,
    /// Translation happens in the consuming client; same as None here.
    ClientSideAuto,
    Papago,
    OpenAi,
    DeepL,
    GenericMt,
}

impl ProviderKind {
    /// Kinds that call out over the network and so require a target language.
    pub fn is_remote(self) -> bool {
        matches!(
            self,
            ProviderKind::Papago | ProviderKind::OpenAi | ProviderKind::DeepL | ProviderKind::GenericMt
        )
    }
}

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Missing credentials for translator '{provider}': {detail}")]
    MissingCredentials {
        provider: &'static str,
        detail: &'static str,
    },
    #[error("Translation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Translation provider returned HTTP {status}")]
    ProviderStatus { status: u16 },
    #[error("Could not parse provider response: {reason}")]
    BadResponse { reason: String },
}

/// One remote translation backend. `text` may be a delimiter-joined batch;
/// providers are expected to return the delimiter intact.
pub trait TranslationProvider {
    fn translate(&mut self, text: &str, target_lang: &str) -> Result<String, TranslateError>;
}

/// API keys for the remote providers, resolved from config and environment
/// before the job starts.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub papago_client_id: Option<String>,
    pub papago_client_secret: Option<String>,
    pub openai_api_key: Option<String>,
    pub deepl_api_key: Option<String>,
}

/// Applies a provider to a block sequence. Holding no provider makes the
/// engine an identity transform.
pub struct TranslationEngine {
    provider: Option<Box<dyn TranslationProvider + Send>>,
}

impl std::fmt::Debug for TranslationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationEngine")
            .field("provider", &self.provider.is_some())
            .finish()
    }
}

impl TranslationEngine {
    /// Build the engine for a provider kind, validating credentials up front
    /// so a misconfigured job fails before any page is fetched.
    pub fn new(
        kind: ProviderKind,
        credentials: &Credentials,
        timeout_secs: u64,
    ) -> Result<Self, TranslateError> {
        let provider: Option<Box<dyn TranslationProvider + Send>> = match kind {
            ProviderKind::None | ProviderKind::ClientSideAuto => None,
            ProviderKind::Papago => {
                let id = credentials.papago_client_id.clone().ok_or(
                    TranslateError::MissingCredentials {
                        provider: "papago",
                        detail: "client id not configured",
                    },
                )?;
                let secret = credentials.papago_client_secret.clone().ok_or(
                    TranslateError::MissingCredentials {
                        provider: "papago",
                        detail: "client secret not configured",
                    },
                )?;
                Some(Box::new(provider::PapagoProvider::new(id, secret, timeout_secs)?))
            }
            ProviderKind::OpenAi => {
                let key = credentials.openai_api_key.clone().ok_or(
                    TranslateError::MissingCredentials {
                        provider: "openai",
                        detail: "API key not configured",
                    },
                )?;
                Some(Box::new(provider::OpenAiProvider::new(key, timeout_secs)?))
            }
            ProviderKind::DeepL => {
                let key = credentials.deepl_api_key.clone().ok_or(
                    TranslateError::MissingCredentials {
                        provider: "deepl",
                        detail: "API key not configured",
                    },
                )?;
                Some(Box::new(provider::DeepLProvider::new(key, timeout_secs)?))
            }
            ProviderKind::GenericMt => {
                Some(Box::new(provider::GenericMtProvider::new(timeout_secs)?))
            }
        };
        Ok(Self { provider })
    }

    /// Engine that passes blocks through unchanged.
    pub fn identity() -> Self {
        Self { provider: None }
    }

    /// Engine over an arbitrary provider.
    pub fn with_provider(provider: Box<dyn TranslationProvider + Send>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    /// Translate every translatable block, preserving order and kind. Block
    /// count in equals block count out; failures keep the original text.
    pub fn translate_blocks(&mut self, blocks: &[Block], target_lang: &str) -> Vec<Block> {
        let mut out = blocks.to_vec();
        let Some(provider) = self.provider.as_mut() else {
            return out;
        };
        let unit_indices: Vec<usize> = out
            .iter()
            .enumerate()
            .filter(|(_, block)| {
                block
                    .translatable_text()
                    .is_some_and(|t| !t.trim().is_empty())
            })
            .map(|(i, _)| i)
            .collect();
        let originals: Vec<String> = unit_indices
            .iter()
            .map(|&i| out[i].translatable_text().unwrap_or("").to_string())
            .collect();
        let results = translate_units(provider.as_mut(), &originals, target_lang);
        for (&i, result) in unit_indices.iter().zip(results.iter()) {
            if !result.translated_text.trim().is_empty() {
                out[i].set_translatable_text(result.translated_text.clone());
            }
        }
        out
    }
}

/// Translate a flat list of text units through one provider, batching
/// consecutive units up to `MAX_BATCH_CHARS`. Always returns exactly one
/// result per unit.
pub fn translate_units(
    provider: &mut dyn TranslationProvider,
    units: &[String],
    target_lang: &str,
) -> Vec<TranslationResult> {
    let delimiter_len = BATCH_DELIMITER.chars().count();
    let mut results = Vec::with_capacity(units.len());
    let mut batch: Vec<&str> = Vec::new();
    let mut batch_len = 0usize;
    for unit in units {
        let added = unit.chars().count() + delimiter_len;
        if !batch.is_empty() && batch_len + added > MAX_BATCH_CHARS {
            results.extend(translate_batch(provider, &batch, target_lang));
            batch.clear();
            batch_len = 0;
        }
        // An oversized single unit still goes out alone.
        batch.push(unit);
        batch_len += added;
    }
    if !batch.is_empty() {
        results.extend(translate_batch(provider, &batch, target_lang));
    }
    results
}

fn translate_batch(
    provider: &mut dyn TranslationProvider,
    batch: &[&str],
    target_lang: &str,
) -> Vec<TranslationResult> {
    let keep_originals = || {
        batch
            .iter()
            .map(|s| TranslationResult {
                original_text: s.to_string(),
                translated_text: s.to_string(),
            })
            .collect::<Vec<_>>()
    };
    let joined = batch.join(BATCH_DELIMITER);
    let translated = match provider.translate(&joined, target_lang) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Warning: translation batch failed, keeping original text: {e}");
            return keep_originals();
        }
    };
    // Split on the marker character alone; providers tend to reflow the
    // surrounding newlines.
    let parts: Vec<&str> = translated.split('\u{2042}').collect();
    if parts.len() != batch.len() {
        eprintln!(
            "Warning: translated batch split into {} units, expected {}; keeping original text",
            parts.len(),
            batch.len()
        );
        return keep_originals();
    }
    batch
        .iter()
        .zip(parts)
        .map(|(original, part)| {
            let trimmed = part.trim();
            TranslationResult {
                original_text: original.to_string(),
                translated_text: if trimmed.is_empty() {
                    original.to_string()
                } else {
                    trimmed.to_string()
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Provider driven by a closure, counting calls.
    struct FakeProvider<F: FnMut(&str) -> Result<String, TranslateError>> {
        calls: usize,
        f: F,
    }

    impl<F: FnMut(&str) -> Result<String, TranslateError>> TranslationProvider for FakeProvider<F> {
        fn translate(&mut self, text: &str, _target_lang: &str) -> Result<String, TranslateError> {
            self.calls += 1;
            (self.f)(text)
        }
    }

    fn paragraphs(texts: &[&str]) -> Vec<Block> {
        texts
            .iter()
            .map(|t| Block::Paragraph {
                text: t.to_string(),
            })
            .collect()
    }

    #[test]
    fn identity_engine_returns_blocks_unchanged() {
        let blocks = paragraphs(&["one", "two"]);
        let mut engine = TranslationEngine::identity();
        assert_eq!(engine.translate_blocks(&blocks, "en"), blocks);
    }

    #[test]
    fn echo_provider_leaves_units_unchanged() {
        let mut provider = FakeProvider {
            calls: 0,
            f: |text: &str| Ok(text.to_string()),
        };
        let units = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let results = translate_units(&mut provider, &units, "ko");
        assert_eq!(provider.calls, 1);
        assert_eq!(results.len(), 3);
        for (result, unit) in results.iter().zip(&units) {
            assert_eq!(&result.translated_text, unit);
        }
    }

    #[test]
    fn delimiter_loss_falls_back_to_originals() {
        let mut provider = FakeProvider {
            calls: 0,
            f: |_: &str| Ok("mangled output without markers".to_string()),
        };
        let units = vec!["alpha".to_string(), "beta".to_string()];
        let results = translate_units(&mut provider, &units, "ko");
        assert_eq!(results[0].translated_text, "alpha");
        assert_eq!(results[1].translated_text, "beta");
    }

    #[test]
    fn provider_error_falls_back_to_originals() {
        let mut provider = FakeProvider {
            calls: 0,
            f: |_: &str| Err(TranslateError::ProviderStatus { status: 500 }),
        };
        let units = vec!["kept".to_string()];
        let results = translate_units(&mut provider, &units, "ko");
        assert_eq!(results[0].translated_text, "kept");
    }

    #[test]
    fn oversized_units_split_into_multiple_batches() {
        let mut provider = FakeProvider {
            calls: 0,
            f: |text: &str| Ok(text.to_string()),
        };
        let big = "x".repeat(3000);
        let units = vec![big.clone(), big.clone(), big];
        let results = translate_units(&mut provider, &units, "ko");
        assert_eq!(results.len(), 3);
        assert_eq!(provider.calls, 3);
    }

    #[test]
    fn empty_translation_keeps_original_unit() {
        let mut provider = FakeProvider {
            calls: 0,
            f: |text: &str| {
                // Blank out the first unit, keep the rest.
                let parts: Vec<&str> = text.split('\u{2042}').collect();
                let mut out: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                out[0] = String::new();
                Ok(out.join("\u{2042}"))
            },
        };
        let units = vec!["first".to_string(), "second".to_string()];
        let results = translate_units(&mut provider, &units, "ko");
        assert_eq!(results[0].translated_text, "first");
        assert_eq!(results[1].translated_text, "second");
    }

    #[test]
    fn engine_rewrites_only_translatable_blocks() {
        let mut engine = TranslationEngine::with_provider(Box::new(FakeProvider {
            calls: 0,
            f: |text: &str| Ok(text.to_uppercase()),
        }));
        let blocks = vec![
            Block::Heading {
                level: 1,
                text: "title".to_string(),
            },
            Block::CodeBlock {
                language: None,
                text: "let x = 1;".to_string(),
            },
        ];
        let out = engine.translate_blocks(&blocks, "en");
        assert_eq!(
            out[0],
            Block::Heading {
                level: 1,
                text: "TITLE".to_string()
            }
        );
        assert_eq!(out[1], blocks[1]);
    }

    #[test]
    fn missing_credentials_fail_engine_construction() {
        let err =
            TranslationEngine::new(ProviderKind::Papago, &Credentials::default(), 30).unwrap_err();
        assert!(matches!(err, TranslateError::MissingCredentials { .. }));
    }
}
