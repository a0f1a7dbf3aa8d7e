mod azure;
mod loopback;
mod traits;

pub use azure::AzureDocumentTranslator;
pub use loopback::LoopbackTranslator;
pub use traits::{
    OutcomeStatus, ServiceError, StorageKind, TargetOutcome, TranslationHandle,
    TranslationRequest, TranslationService, TranslationServiceInfo, TranslationTarget,
};

use crate::config::TranslatorConfig;
use crate::error::{Error, Result};
use std::sync::Arc;

/// Create the document translation client from configuration
pub fn create_translation_service(config: &TranslatorConfig) -> Result<Arc<dyn TranslationService>> {
    let endpoint = config
        .endpoint
        .clone()
        .ok_or_else(|| Error::ConfigMissing("translator.endpoint".to_string()))?;
    let api_key = config
        .api_key
        .clone()
        .ok_or_else(|| Error::ConfigMissing("translator.api_key".to_string()))?;

    Ok(Arc::new(AzureDocumentTranslator::new(endpoint, api_key, config)))
}
