//! The Greetings server's request handler.

use crate::messages::{GreetingReply, GreetingRequest};
use cr_01_correlation_engine::HandlerError;
use cr_02_service_activator::{ActivatorError, HandlerRegistry};
use shared_types::ChannelName;
use tracing::info;

/// Morning salutation for a language tag. Unknown languages get English.
pub fn salutation(language: &str) -> &'static str {
    let primary = language
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    match primary.as_str() {
        "fr" => "Bonjour",
        "de" => "Guten Morgen",
        "es" => "Buenos días",
        "it" => "Buongiorno",
        _ => "Good morning",
    }
}

/// Answer a greeting request.
pub async fn greet(request: GreetingRequest) -> Result<GreetingReply, HandlerError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(HandlerError::Failed("greeting request has no name".into()));
    }

    info!(name = %name, language = %request.language, "Received greeting request");
    Ok(GreetingReply {
        greeting: format!("{}, {}", salutation(&request.language), name),
    })
}

/// Register [`greet`] for requests on `channel`.
pub fn register(
    registry: &mut HandlerRegistry,
    channel: ChannelName,
) -> Result<(), ActivatorError> {
    registry.register(channel, greet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_greets_in_english() {
        let reply = greet(GreetingRequest::new("Ian", "en-gb")).await.unwrap();
        assert_eq!(reply.greeting, "Good morning, Ian");
    }

    #[test]
    fn test_salutation_by_language() {
        assert_eq!(salutation("fr-FR"), "Bonjour");
        assert_eq!(salutation("DE"), "Guten Morgen");
        assert_eq!(salutation("es_MX"), "Buenos días");
        assert_eq!(salutation("tlh"), "Good morning");
        assert_eq!(salutation(""), "Good morning");
    }

    #[tokio::test]
    async fn test_rejects_blank_name() {
        assert!(matches!(
            greet(GreetingRequest::new("  ", "en-gb")).await,
            Err(HandlerError::Failed(_))
        ));
    }
}
