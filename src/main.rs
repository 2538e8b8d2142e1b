use anyhow::Result;
use log::info;
use std::sync::Arc;
use topic2lesson::completion::CompletionTracker;
use topic2lesson::config::Config;
use topic2lesson::dialogue::DialogueSynthesizer;
use topic2lesson::llm::create_llm;
use topic2lesson::server::{serve, AppState};
use topic2lesson::speech::create_speech_client;
use topic2lesson::store::{AudioStore, EpisodeStore, SupabaseStore};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config_path =
        std::env::args().nth(1).unwrap_or_else(|| "config.yml".to_string());
    let config = Config::load(&config_path)?;

    let llm = create_llm(&config.llm)?;
    let speech = create_speech_client(&config.tts)?;
    let synthesizer = Arc::new(DialogueSynthesizer::new(
        Arc::from(speech),
        config.tts.turn_gap_ms,
    ));

    let (audio_store, episodes, tracker) = match &config.storage {
        Some(storage) => {
            let store = Arc::new(SupabaseStore::new(storage)?);
            info!("Storage enabled (bucket: {})", storage.bucket);
            (
                Some(store.clone() as Arc<dyn AudioStore>),
                Some(store.clone() as Arc<dyn EpisodeStore>),
                Some(Arc::new(CompletionTracker::new(store))),
            )
        }
        None => {
            info!("Storage not configured, audio will be returned inline");
            (None, None, None)
        }
    };

    let state = AppState {
        llm: Arc::from(llm),
        synthesizer,
        audio_store,
        episodes,
        tracker,
        config: Arc::new(config),
    };

    serve(state).await
}
