use tracing::{debug, warn};

use super::{ElevenLabsProvider, OpenAiProvider, SpeechProvider, SynthesisError};
use crate::audio::AudioClip;
use crate::config::{ProviderConfig, ProviderKind, ProvidersConfig};
use crate::debate::Side;
use crate::error::JudgingError;
use crate::pairing::{Voice, VoicePairing};

/// Provider credentials, resolved once per process.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub primary: Option<String>,
    pub secondary: Option<String>,
}

impl Credentials {
    pub fn from_env(config: &ProvidersConfig) -> Self {
        Self {
            primary: config.primary.credential_from_env(),
            secondary: config.secondary.credential_from_env(),
        }
    }
}

/// Result of one successful synthesis call.
#[derive(Debug, Clone)]
pub struct Synthesized {
    pub clip: AudioClip,
    pub provider: ProviderKind,
    pub model: String,
    pub voice: Voice,
}

/// Configured providers in rank order.
pub struct ProviderChain {
    providers: Vec<Box<dyn SpeechProvider>>,
}

impl ProviderChain {
    pub fn new(providers: Vec<Box<dyn SpeechProvider>>) -> Self {
        Self { providers }
    }

    /// Rank providers by which credentials are present: primary first,
    /// then secondary.
    pub fn from_config(
        config: &ProvidersConfig,
        credentials: &Credentials,
    ) -> Result<Self, JudgingError> {
        Self::rank(config, credentials, build_provider)
    }

    /// [`ProviderChain::from_config`] with `build` constructing each
    /// selected provider.
    pub(crate) fn rank<F>(
        config: &ProvidersConfig,
        credentials: &Credentials,
        mut build: F,
    ) -> Result<Self, JudgingError>
    where
        F: FnMut(&ProviderConfig, String) -> Result<Box<dyn SpeechProvider>, JudgingError>,
    {
        let mut providers = Vec::new();
        if let Some(key) = &credentials.primary {
            providers.push(build(&config.primary, key.clone())?);
        }
        if let Some(key) = &credentials.secondary {
            providers.push(build(&config.secondary, key.clone())?);
        }

        if providers.is_empty() {
            return Err(JudgingError::NoProviderConfigured {
                primary_env: config.primary.api_key_env.clone(),
                secondary_env: config.secondary.api_key_env.clone(),
            });
        }

        debug!(
            providers = ?providers.iter().map(|p| p.kind().as_str()).collect::<Vec<_>>(),
            "Speech providers selected"
        );
        Ok(Self { providers })
    }

    /// Pool size the pairing is computed over.
    pub fn pool_size(&self) -> usize {
        self.providers.first().map(|p| p.pool().len()).unwrap_or(0)
    }

    /// Synthesize one turn, trying each provider once in rank order. The
    /// side's voice is looked up by pool position in every provider's pool.
    pub async fn synthesize(
        &self,
        text: &str,
        pairing: VoicePairing,
        side: Side,
    ) -> Result<Synthesized, JudgingError> {
        let index = pairing.index_for(side);
        let mut failures = Vec::new();

        for provider in &self.providers {
            let name = provider.kind().as_str();
            let Some(voice) = provider.pool().get(index) else {
                failures.push(format!("{name}: no voice at pool position {index}"));
                continue;
            };

            match provider.synthesize(text, voice).await {
                Ok(clip) => {
                    return Ok(Synthesized {
                        clip,
                        provider: provider.kind(),
                        model: provider.model_id().to_string(),
                        voice: voice.clone(),
                    });
                }
                Err(e) => {
                    warn!(provider = name, side = %side, error = %e, "Speech synthesis failed");
                    failures.push(format!("{name}: {e}"));
                }
            }
        }

        if failures.is_empty() {
            failures.push("no providers configured".to_string());
        }
        Err(JudgingError::SynthesisUnavailable(failures.join("; ")))
    }
}

fn build_provider(
    config: &ProviderConfig,
    api_key: String,
) -> Result<Box<dyn SpeechProvider>, JudgingError> {
    let provider: Box<dyn SpeechProvider> = match config.kind {
        ProviderKind::ElevenLabs => {
            Box::new(ElevenLabsProvider::new(config, api_key).map_err(unavailable)?)
        }
        ProviderKind::OpenAi => {
            Box::new(OpenAiProvider::new(config, api_key).map_err(unavailable)?)
        }
    };
    Ok(provider)
}

fn unavailable(e: SynthesisError) -> JudgingError {
    JudgingError::SynthesisUnavailable(e.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::default_config;
    use crate::pairing::VoicePool;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fake provider that records calls and either succeeds or fails.
    pub(crate) struct FakeProvider {
        pub kind: ProviderKind,
        pub pool: VoicePool,
        pub fail: bool,
        pub calls: Arc<AtomicUsize>,
        pub voices_used: Arc<std::sync::Mutex<Vec<String>>>,
    }

    impl FakeProvider {
        pub(crate) fn new(kind: ProviderKind, prefix: &str, fail: bool) -> Self {
            let voices = (0..4)
                .map(|i| Voice::new(format!("{prefix}{i}"), format!("{prefix} {i}")))
                .collect();
            Self {
                kind,
                pool: VoicePool::new(voices),
                fail,
                calls: Arc::new(AtomicUsize::new(0)),
                voices_used: Arc::new(std::sync::Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl SpeechProvider for FakeProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn model_id(&self) -> &str {
            "fake-model"
        }

        fn pool(&self) -> &VoicePool {
            &self.pool
        }

        async fn synthesize(&self, text: &str, voice: &Voice) -> Result<AudioClip, SynthesisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.voices_used.lock().unwrap().push(voice.id.clone());
            if self.fail {
                return Err(SynthesisError::Status {
                    provider: "fake",
                    status: 429,
                    body: "rate limited".to_string(),
                });
            }
            // One sample per character keeps durations predictable.
            Ok(AudioClip::new(vec![0.25; text.len()], 100))
        }
    }

    const PAIRING: VoicePairing = VoicePairing {
        aff_index: 1,
        neg_index: 3,
    };

    #[test]
    fn test_no_credentials_is_no_provider_configured() {
        let config = default_config();
        let result = ProviderChain::from_config(&config.providers, &Credentials::default());
        match result {
            Err(JudgingError::NoProviderConfigured { primary_env, secondary_env }) => {
                assert_eq!(primary_env, "DF_ELEVENLABS_API_KEY");
                assert_eq!(secondary_env, "DF_OPENAI_API_KEY");
            }
            _ => panic!("expected NoProviderConfigured"),
        }
    }

    /// Builds failing-or-succeeding fakes and records which were built.
    fn rank_fakes(
        credentials: &Credentials,
        primary_fails: bool,
    ) -> (Result<ProviderChain, JudgingError>, Vec<ProviderKind>) {
        let config = default_config();
        let mut built = Vec::new();
        let chain = ProviderChain::rank(&config.providers, credentials, |provider, _key| {
            built.push(provider.kind);
            let fail = primary_fails && provider.kind == ProviderKind::ElevenLabs;
            let fake: Box<dyn SpeechProvider> =
                Box::new(FakeProvider::new(provider.kind, provider.kind.as_str(), fail));
            Ok(fake)
        });
        (chain, built)
    }

    #[test]
    fn test_selection_order_follows_credentials() {
        let both = Credentials {
            primary: Some("p".to_string()),
            secondary: Some("s".to_string()),
        };
        let (chain, built) = rank_fakes(&both, false);
        assert!(chain.is_ok());
        assert_eq!(built, vec![ProviderKind::ElevenLabs, ProviderKind::OpenAi]);

        let secondary_only = Credentials {
            primary: None,
            secondary: Some("s".to_string()),
        };
        let chain =
            ProviderChain::from_config(&default_config().providers, &secondary_only).unwrap();
        assert_eq!(chain.pool_size(), 6);
    }

    #[tokio::test]
    async fn test_primary_success_skips_secondary() {
        let primary = FakeProvider::new(ProviderKind::ElevenLabs, "p", false);
        let secondary = FakeProvider::new(ProviderKind::OpenAi, "s", false);
        let secondary_calls = secondary.calls.clone();
        let chain = ProviderChain::new(vec![Box::new(primary), Box::new(secondary)]);

        let out = chain.synthesize("hello", PAIRING, Side::Aff).await.unwrap();
        assert_eq!(out.provider, ProviderKind::ElevenLabs);
        assert_eq!(out.voice.id, "p1");
        assert_eq!(secondary_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_remaps_voice_by_position() {
        let primary = FakeProvider::new(ProviderKind::ElevenLabs, "p", true);
        let secondary = FakeProvider::new(ProviderKind::OpenAi, "s", false);
        let primary_calls = primary.calls.clone();
        let chain = ProviderChain::new(vec![Box::new(primary), Box::new(secondary)]);

        let aff = chain.synthesize("hello", PAIRING, Side::Aff).await.unwrap();
        let neg = chain.synthesize("world", PAIRING, Side::Neg).await.unwrap();
        assert_eq!(aff.provider, ProviderKind::OpenAi);
        assert_eq!(aff.voice.id, "s1");
        assert_eq!(neg.voice.id, "s3");
        assert_eq!(primary_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_primary_failure_without_secondary_is_unavailable() {
        let primary = FakeProvider::new(ProviderKind::ElevenLabs, "p", true);
        let calls = primary.calls.clone();
        let chain = ProviderChain::new(vec![Box::new(primary)]);

        let err = chain.synthesize("hello", PAIRING, Side::Neg).await.unwrap_err();
        assert!(matches!(err, JudgingError::SynthesisUnavailable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_secondary_only_never_touches_primary() {
        let secondary_only = Credentials {
            primary: None,
            secondary: Some("s".to_string()),
        };
        let (chain, built) = rank_fakes(&secondary_only, false);
        assert_eq!(built, vec![ProviderKind::OpenAi]);

        let out = chain.unwrap().synthesize("hello", PAIRING, Side::Aff).await.unwrap();
        assert_eq!(out.provider, ProviderKind::OpenAi);
        assert_eq!(out.voice.id, "openai1");
    }

    #[tokio::test]
    async fn test_failing_primary_alone_is_unavailable() {
        let primary_only = Credentials {
            primary: Some("p".to_string()),
            secondary: None,
        };
        let (chain, built) = rank_fakes(&primary_only, true);
        assert_eq!(built, vec![ProviderKind::ElevenLabs]);

        let err = chain.unwrap().synthesize("hello", PAIRING, Side::Neg).await.unwrap_err();
        assert!(matches!(err, JudgingError::SynthesisUnavailable(_)));
    }
}
