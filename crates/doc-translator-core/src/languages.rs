//! Target languages offered for translation.

use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{AppConfig, Lang};
use crate::error::{Error, Result};

/// A selectable target language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageOption {
    /// Display label, "{name} ({nativeName})"
    pub label: String,
    /// Language code understood by the translation service
    pub code: String,
}

impl LanguageOption {
    fn new(label: &str, code: &str) -> Self {
        Self {
            label: label.to_string(),
            code: code.to_string(),
        }
    }

    pub fn lang(&self) -> Lang {
        Lang::new(self.code.clone())
    }
}

/// Used whenever the live list cannot be fetched
pub fn default_languages() -> Vec<LanguageOption> {
    vec![
        LanguageOption::new("한국어 (Korean)", "ko"),
        LanguageOption::new("영어 (English)", "en"),
        LanguageOption::new("일본어 (Japanese)", "ja"),
        LanguageOption::new("중국어 간체 (Chinese Simplified)", "zh-Hans"),
        LanguageOption::new("중국어 번체 (Chinese Traditional)", "zh-Hant"),
        LanguageOption::new("프랑스어 (French)", "fr"),
        LanguageOption::new("독일어 (German)", "de"),
        LanguageOption::new("스페인어 (Spanish)", "es"),
        LanguageOption::new("러시아어 (Russian)", "ru"),
        LanguageOption::new("베트남어 (Vietnamese)", "vi"),
    ]
}

#[derive(Debug, Deserialize)]
struct LanguagesResponse {
    translation: BTreeMap<String, LanguageInfo>,
}

#[derive(Debug, Deserialize)]
struct LanguageInfo {
    name: String,
    #[serde(rename = "nativeName")]
    native_name: String,
}

/// Parse a `/languages?scope=translation` response body, sorted by label
pub fn parse_languages(body: &str) -> Result<Vec<LanguageOption>> {
    let response: LanguagesResponse = serde_json::from_str(body)
        .map_err(|e| Error::TranslationInvalidResponse(format!("language list: {e}")))?;

    let mut options: Vec<LanguageOption> = response
        .translation
        .into_iter()
        .map(|(code, info)| LanguageOption {
            label: format!("{} ({})", info.name, info.native_name),
            code,
        })
        .collect();
    options.sort_by(|a, b| a.label.cmp(&b.label));
    Ok(options)
}

/// Fetch the live list with names localized for `display_locale`
pub async fn fetch_supported_languages(
    client: &Client,
    endpoint: &str,
    display_locale: &str,
) -> Result<Vec<LanguageOption>> {
    let url = format!(
        "{}/languages?api-version=3.0&scope=translation",
        endpoint.trim_end_matches('/')
    );
    debug!("Fetching language list from {}", url);

    let response = client
        .get(&url)
        .header("Accept-Language", display_locale)
        .send()
        .await
        .map_err(|e| Error::TranslationRequest(e.to_string()))?;

    if !response.status().is_success() {
        return Err(Error::TranslationRequest(format!(
            "language list: HTTP {}",
            response.status()
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| Error::TranslationInvalidResponse(e.to_string()))?;
    let options = parse_languages(&body)?;
    if options.is_empty() {
        return Err(Error::TranslationInvalidResponse(
            "language list is empty".to_string(),
        ));
    }
    Ok(options)
}

/// Live list, or the built-in list on any failure
pub async fn supported_languages_or_default(
    client: &Client,
    endpoint: &str,
    display_locale: &str,
) -> Vec<LanguageOption> {
    match fetch_supported_languages(client, endpoint, display_locale).await {
        Ok(options) => options,
        Err(e) => {
            warn!("Failed to fetch language list, using defaults: {}", e);
            default_languages()
        }
    }
}

/// Language list for the configured endpoint and display locale
pub async fn supported_languages(config: &AppConfig) -> Vec<LanguageOption> {
    let client = match Client::builder().timeout(Duration::from_secs(5)).build() {
        Ok(client) => client,
        Err(e) => {
            warn!("Failed to create HTTP client, using default languages: {}", e);
            return default_languages();
        }
    };
    supported_languages_or_default(
        &client,
        &config.translator.languages_endpoint,
        &config.display_locale,
    )
    .await
}

/// Index to preselect: Korean when offered, else the first entry
pub fn default_target_index(options: &[LanguageOption]) -> usize {
    options.iter().position(|o| o.code == "ko").unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BODY: &str = r#"{
        "translation": {
            "fr": {"name": "French", "nativeName": "Français", "dir": "ltr"},
            "de": {"name": "German", "nativeName": "Deutsch", "dir": "ltr"},
            "ko": {"name": "Korean", "nativeName": "한국어", "dir": "ltr"}
        }
    }"#;

    #[test]
    fn test_parse_sorts_by_label() {
        let options = parse_languages(BODY).unwrap();
        let labels: Vec<_> = options.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["French (Français)", "German (Deutsch)", "Korean (한국어)"]
        );
        assert_eq!(options[2].lang(), Lang::from("ko"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_languages("{}").is_err());
        assert!(parse_languages("not json").is_err());
    }

    #[test]
    fn test_default_target_index() {
        let defaults = default_languages();
        assert_eq!(defaults.len(), 10);
        assert_eq!(default_target_index(&defaults), 0);

        let options = parse_languages(BODY).unwrap();
        assert_eq!(default_target_index(&options), 2);
        assert_eq!(default_target_index(&options[..2]), 0);
    }

    #[tokio::test]
    async fn test_fetch_sends_locale() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/languages"))
            .and(query_param("api-version", "3.0"))
            .and(query_param("scope", "translation"))
            .and(header("Accept-Language", "ko"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
            .mount(&server)
            .await;

        let options = fetch_supported_languages(&Client::new(), &server.uri(), "ko")
            .await
            .unwrap();
        assert_eq!(options.len(), 3);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/languages"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let options = supported_languages_or_default(&Client::new(), &server.uri(), "ko").await;
        assert_eq!(options, default_languages());
    }
}
