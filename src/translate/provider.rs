//! Remote translation backends. Each provider owns its own blocking client;
//! translation traffic must not inherit the page fetcher's politeness delay.

use super::{TranslateError, TranslationProvider};
use std::time::Duration;

const PAPAGO_URL: &str = "https://openapi.naver.com/v1/papago/n2mt";
const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const OPENAI_MODEL: &str = "gpt-3.5-turbo";
const DEEPL_URL: &str = "https://api-free.deepl.com/v2/translate";
const GENERIC_MT_URL: &str = "https://translate.googleapis.com/translate_a/single";

fn build_client(timeout_secs: u64) -> Result<reqwest::blocking::Client, TranslateError> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(TranslateError::Http)
}

fn check_status(response: &reqwest::blocking::Response) -> Result<(), TranslateError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(TranslateError::ProviderStatus {
            status: status.as_u16(),
        })
    }
}

/// Naver Papago NMT.
pub struct PapagoProvider {
    client: reqwest::blocking::Client,
    client_id: String,
    client_secret: String,
}

impl PapagoProvider {
    pub fn new(
        client_id: String,
        client_secret: String,
        timeout_secs: u64,
    ) -> Result<Self, TranslateError> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            client_id,
            client_secret,
        })
    }
}

impl TranslationProvider for PapagoProvider {
    fn translate(&mut self, text: &str, target_lang: &str) -> Result<String, TranslateError> {
        // Papago requires an explicit source language. The dominant pairing
        // is Korean on one side of the request.
        let source = if target_lang == "ko" { "en" } else { "ko" };
        let response = self
            .client
            .post(PAPAGO_URL)
            .header("X-Naver-Client-Id", &self.client_id)
            .header("X-Naver-Client-Secret", &self.client_secret)
            .form(&[("source", source), ("target", target_lang), ("text", text)])
            .send()?;
        check_status(&response)?;
        let body: serde_json::Value = response.json()?;
        body["message"]["result"]["translatedText"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| TranslateError::BadResponse {
                reason: "message.result.translatedText missing".to_string(),
            })
    }
}

/// OpenAI chat completions used as a translator.
pub struct OpenAiProvider {
    client: reqwest::blocking::Client,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, timeout_secs: u64) -> Result<Self, TranslateError> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            api_key,
        })
    }
}

impl TranslationProvider for OpenAiProvider {
    fn translate(&mut self, text: &str, target_lang: &str) -> Result<String, TranslateError> {
        let body = serde_json::json!({
            "model": OPENAI_MODEL,
            "messages": [
                {
                    "role": "system",
                    "content": format!(
                        "Translate the user's text into '{target_lang}'. Keep the '\u{2042}' \
                         separator lines exactly where they are. Output only the translation."
                    )
                },
                { "role": "user", "content": text }
            ],
            "temperature": 0.2
        });
        let response = self
            .client
            .post(OPENAI_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;
        check_status(&response)?;
        let body: serde_json::Value = response.json()?;
        body["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| TranslateError::BadResponse {
                reason: "choices[0].message.content missing".to_string(),
            })
    }
}

/// DeepL REST API (free tier endpoint).
pub struct DeepLProvider {
    client: reqwest::blocking::Client,
    api_key: String,
}

impl DeepLProvider {
    pub fn new(api_key: String, timeout_secs: u64) -> Result<Self, TranslateError> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            api_key,
        })
    }
}

impl TranslationProvider for DeepLProvider {
    fn translate(&mut self, text: &str, target_lang: &str) -> Result<String, TranslateError> {
        let target = target_lang.to_uppercase();
        let response = self
            .client
            .post(DEEPL_URL)
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .form(&[("text", text), ("target_lang", target.as_str())])
            .send()?;
        check_status(&response)?;
        let body: serde_json::Value = response.json()?;
        body["translations"][0]["text"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| TranslateError::BadResponse {
                reason: "translations[0].text missing".to_string(),
            })
    }
}

/// Keyless web endpoint. Best effort only; response is an untyped nested
/// array of translated segments.
pub struct GenericMtProvider {
    client: reqwest::blocking::Client,
}

impl GenericMtProvider {
    pub fn new(timeout_secs: u64) -> Result<Self, TranslateError> {
        Ok(Self {
            client: build_client(timeout_secs)?,
        })
    }
}

impl TranslationProvider for GenericMtProvider {
    fn translate(&mut self, text: &str, target_lang: &str) -> Result<String, TranslateError> {
        let response = self
            .client
            .get(GENERIC_MT_URL)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", target_lang),
                ("dt", "t"),
                ("q", text),
            ])
            .send()?;
        check_status(&response)?;
        let body: serde_json::Value = response.json()?;
        let segments = body
            .get(0)
            .and_then(|v| v.as_array())
            .ok_or_else(|| TranslateError::BadResponse {
                reason: "segment array missing".to_string(),
            })?;
        let mut out = String::new();
        for segment in segments {
            if let Some(piece) = segment.get(0).and_then(|v| v.as_str()) {
                out.push_str(piece);
            }
        }
        if out.is_empty() {
            return Err(TranslateError::BadResponse {
                reason: "no translated segments".to_string(),
            });
        }
        Ok(out)
    }
}
