use crate::assembler::generate_lesson_content;
use crate::completion::CompletionTracker;
use crate::config::Config;
use crate::dialogue::{DialogueSynthesizer, DEFAULT_PROFILE};
use crate::error::PipelineResult;
use crate::llm::LlmClient;
use crate::model::{DialogueTurn, Speaker, VoiceParams};
use crate::outline::{generate_outline, OutlineRequest};
use crate::source::fetch_source_context;
use crate::store::{AudioStore, EpisodeStore};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub llm: Arc<dyn LlmClient>,
    pub synthesizer: Arc<DialogueSynthesizer>,
    pub audio_store: Option<Arc<dyn AudioStore>>,
    pub episodes: Option<Arc<dyn EpisodeStore>>,
    pub tracker: Option<Arc<CompletionTracker>>,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/list_voices", get(list_voices))
        .route("/generate_content", post(generate_content))
        .route("/generate_outline_only", post(generate_outline_only))
        .route("/generate_tts", post(generate_tts))
        .route("/generate_segment_audio", post(generate_segment_audio))
        .with_state(state)
}

fn ok(mut body: Value) -> Json<Value> {
    body["success"] = json!(true);
    Json(body)
}

fn fail(message: impl std::fmt::Display) -> Json<Value> {
    Json(json!({ "success": false, "error": message.to_string() }))
}

// --- content generation ---

#[derive(Deserialize)]
pub struct ContentRequest {
    #[serde(default)]
    pub topic: String,
    #[serde(default = "one")]
    pub lesson_number: u32,
    #[serde(default = "one")]
    pub total_lessons: u32,
    #[serde(default = "default_user_level")]
    pub user_level: String,
    #[serde(default = "default_duration")]
    pub duration_minutes: u32,
    #[serde(default)]
    pub source_urls: Vec<String>,
    /// Overrides the configured roster for this request only.
    #[serde(default)]
    pub speakers: Option<Vec<Speaker>>,
}

fn one() -> u32 {
    1
}

fn default_user_level() -> String {
    "intermediate".to_string()
}

fn default_duration() -> u32 {
    10
}

impl ContentRequest {
    async fn into_outline_request(self, config: &Config) -> OutlineRequest {
        let source_context = if self.source_urls.is_empty() {
            None
        } else {
            fetch_source_context(&self.source_urls).await
        };
        OutlineRequest {
            topic: self.topic,
            lesson_number: self.lesson_number,
            total_lessons: self.total_lessons,
            user_level: self.user_level,
            duration_minutes: self.duration_minutes,
            speakers: self.speakers.unwrap_or_else(|| config.speakers.clone()),
            source_context,
        }
    }
}

pub async fn generate_content(
    State(state): State<AppState>,
    Json(req): Json<ContentRequest>,
) -> Json<Value> {
    if req.topic.trim().is_empty() {
        return fail("Topic is required");
    }

    let request = req.into_outline_request(&state.config).await;
    match generate_lesson_content(state.llm.as_ref(), &request).await {
        Ok(lesson) => match serde_json::to_value(&lesson) {
            Ok(value) => ok(json!({ "lesson": value })),
            Err(e) => fail(e),
        },
        Err(e) => {
            error!("Content generation failed: {}", e);
            fail(e)
        }
    }
}

pub async fn generate_outline_only(
    State(state): State<AppState>,
    Json(req): Json<ContentRequest>,
) -> Json<Value> {
    if req.topic.trim().is_empty() {
        return fail("Topic is required");
    }

    let request = req.into_outline_request(&state.config).await;
    match generate_outline(state.llm.as_ref(), &request).await {
        Ok(outline) => match serde_json::to_value(&outline) {
            Ok(value) => ok(json!({ "outline": value })),
            Err(e) => fail(e),
        },
        Err(e) => {
            error!("Outline generation failed: {}", e);
            fail(e)
        }
    }
}

// --- speech synthesis ---

#[derive(Deserialize)]
pub struct TtsRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub transcript: Option<Vec<DialogueTurn>>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub episode_id: Option<String>,
    /// Voice to speak `text` with in simple mode.
    #[serde(default)]
    pub speaker: Option<String>,
    /// Overrides the configured voice profile table for this request only.
    #[serde(default)]
    pub voice_profiles: Option<HashMap<String, VoiceParams>>,
}

pub async fn generate_tts(
    State(state): State<AppState>,
    Json(req): Json<TtsRequest>,
) -> Json<Value> {
    let (wav, mode) = match synthesize_request_audio(&state, &req).await {
        Ok(out) => out,
        Err(e) => {
            error!("Synthesis failed: {}", e);
            return fail(e);
        }
    };

    match (&req.user_id, &req.episode_id, &state.audio_store) {
        (Some(user_id), Some(episode_id), Some(store)) => {
            let path = format!("{}/{}.wav", user_id, episode_id);
            match store.persist_audio(&path, &wav).await {
                Ok(url) => {
                    finalize_upload(&state, episode_id, &url).await;
                    ok(json!({ "audio_url": url, "storage_path": path, "mode": mode }))
                }
                Err(e) => {
                    // Synthesis succeeded; hand the audio back inline so the
                    // caller does not have to pay for it twice.
                    warn!("Upload failed, returning audio inline: {}", e);
                    ok(json!({
                        "audio_base64": BASE64.encode(&wav),
                        "mode": mode,
                        "upload_error": e.to_string(),
                    }))
                }
            }
        }
        _ => ok(json!({ "audio_base64": BASE64.encode(&wav), "mode": mode })),
    }
}

async fn synthesize_request_audio(
    state: &AppState,
    req: &TtsRequest,
) -> PipelineResult<(Vec<u8>, &'static str)> {
    use crate::error::PipelineError;

    let profiles = req
        .voice_profiles
        .clone()
        .unwrap_or_else(|| state.config.effective_voice_profiles());

    if let Some(transcript) = &req.transcript {
        let wav = state
            .synthesizer
            .synthesize_dialogue(transcript, &profiles)
            .await?;
        return Ok((wav, "dialogue"));
    }
    if let Some(text) = &req.text {
        // Simple mode: one turn, spoken by the named speaker or the default.
        let turns = vec![DialogueTurn {
            speaker: req
                .speaker
                .clone()
                .unwrap_or_else(|| DEFAULT_PROFILE.to_string()),
            dialogue: text.clone(),
        }];
        let wav = state.synthesizer.synthesize_dialogue(&turns, &profiles).await?;
        return Ok((wav, "simple"));
    }
    Err(PipelineError::Validation(
        "Either 'transcript' or 'text' is required".to_string(),
    ))
}

/// Records the episode's audio URL and re-checks lesson completion. Both are
/// best effort once the artifact is safely stored.
async fn finalize_upload(state: &AppState, episode_id: &str, url: &str) {
    if let Some(episodes) = &state.episodes {
        if let Err(e) = episodes.set_episode_audio(episode_id, url).await {
            warn!("Failed to record audio URL for {}: {}", episode_id, e);
            return;
        }
    }
    if let Some(tracker) = &state.tracker {
        if let Err(e) = tracker.on_audio_uploaded(episode_id).await {
            warn!("Completion check failed for {}: {}", episode_id, e);
        }
    }
}

// --- per-segment synthesis ---

#[derive(Deserialize)]
pub struct SegmentBody {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub transcript: Vec<DialogueTurn>,
}

#[derive(Deserialize)]
pub struct SegmentAudioRequest {
    pub segment: SegmentBody,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub lesson_id: String,
    #[serde(default)]
    pub segment_index: u32,
    #[serde(default)]
    pub voice_profiles: Option<HashMap<String, VoiceParams>>,
}

pub async fn generate_segment_audio(
    State(state): State<AppState>,
    Json(req): Json<SegmentAudioRequest>,
) -> Json<Value> {
    if req.segment.transcript.is_empty() {
        return fail("No transcript in segment");
    }
    if req.user_id.trim().is_empty() || req.lesson_id.trim().is_empty() {
        return fail("user_id and lesson_id are required");
    }

    let profiles = req
        .voice_profiles
        .clone()
        .unwrap_or_else(|| state.config.effective_voice_profiles());
    let wav = match state
        .synthesizer
        .synthesize_dialogue(&req.segment.transcript, &profiles)
        .await
    {
        Ok(wav) => wav,
        Err(e) => {
            error!(
                "Segment synthesis failed for lesson {} segment {}: {}",
                req.lesson_id, req.segment_index, e
            );
            return fail(e);
        }
    };

    let episode_id = format!("{}_segment_{}", req.lesson_id, req.segment_index);
    let mut body = json!({
        "segment_index": req.segment_index,
        "segment_title": req.segment.title,
        "turn_count": req.segment.transcript.len(),
        "mode": "dialogue",
    });

    match &state.audio_store {
        Some(store) => {
            let path = format!("{}/{}.wav", req.user_id, episode_id);
            match store.persist_audio(&path, &wav).await {
                Ok(url) => {
                    finalize_upload(&state, &episode_id, &url).await;
                    body["audio_url"] = json!(url);
                    body["storage_path"] = json!(path);
                }
                Err(e) => {
                    warn!("Segment upload failed, returning audio inline: {}", e);
                    body["audio_base64"] = json!(BASE64.encode(&wav));
                    body["upload_error"] = json!(e.to_string());
                }
            }
        }
        None => {
            body["audio_base64"] = json!(BASE64.encode(&wav));
        }
    }

    ok(body)
}

// --- health & voices ---

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let mut features = vec![
        "single-speaker",
        "multi-speaker-dialogue",
        "voice-profiles",
        "segment-generation",
    ];
    if state.audio_store.is_some() {
        features.push("storage");
    }
    if state.tracker.is_some() {
        features.push("completion-tracking");
    }

    let voices: Vec<String> = state
        .config
        .effective_voice_profiles()
        .into_keys()
        .collect();

    Json(json!({
        "status": "healthy",
        "service": "topic2lesson",
        "version": env!("CARGO_PKG_VERSION"),
        "features": features,
        "voice_profiles": voices,
    }))
}

pub async fn list_voices(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "voices": state.config.effective_voice_profiles() }))
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let bind = state.config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Listening on {}", bind);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::test_wav;
    use crate::error::PipelineError;
    use crate::model::Episode;
    use crate::speech::SpeechClient;
    use crate::store::MemoryStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct CannedLlm(String);

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn chat(&self, _system: &str, _user: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    /// Records every (text, voice) pair it is asked to speak.
    struct RecordingSpeech {
        calls: Mutex<Vec<(String, VoiceParams)>>,
    }

    impl RecordingSpeech {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SpeechClient for RecordingSpeech {
        async fn synthesize(&self, text: &str, voice: &VoiceParams) -> PipelineResult<Vec<u8>> {
            self.calls
                .lock()
                .unwrap()
                .push((text.to_string(), voice.clone()));
            Ok(test_wav(100, 24_000))
        }
    }

    /// Upload always fails; used to exercise the inline-audio fallback.
    struct BrokenStore;

    #[async_trait]
    impl AudioStore for BrokenStore {
        async fn persist_audio(&self, _path: &str, _bytes: &[u8]) -> PipelineResult<String> {
            Err(PipelineError::Storage("bucket unreachable".to_string()))
        }
    }

    fn test_config() -> Config {
        serde_yaml_ng::from_str(
            r#"
llm:
  provider: openai
  openai:
    api_key: sk-test
    model: gpt-4
tts:
  base_url: http://localhost:8000
"#,
        )
        .unwrap()
    }

    fn state_with(store: Option<Arc<MemoryStore>>) -> (AppState, Arc<RecordingSpeech>) {
        let config = Arc::new(test_config());
        let speech = Arc::new(RecordingSpeech::new());
        let synthesizer = Arc::new(DialogueSynthesizer::new(speech.clone(), 300));
        let (audio_store, episodes, tracker) = match store {
            Some(store) => (
                Some(store.clone() as Arc<dyn AudioStore>),
                Some(store.clone() as Arc<dyn EpisodeStore>),
                Some(Arc::new(CompletionTracker::new(store))),
            ),
            None => (None, None, None),
        };
        (
            AppState {
                llm: Arc::new(CannedLlm("{}".to_string())),
                synthesizer,
                audio_store,
                episodes,
                tracker,
                config,
            },
            speech,
        )
    }

    fn turns() -> Vec<DialogueTurn> {
        vec![DialogueTurn {
            speaker: "Alex".to_string(),
            dialogue: "hello".to_string(),
        }]
    }

    fn content_request(topic: &str) -> ContentRequest {
        serde_json::from_value(json!({ "topic": topic })).unwrap()
    }

    fn tts_request(body: Value) -> TtsRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_content_request_defaults() {
        let req = content_request("Rust");
        assert_eq!(req.lesson_number, 1);
        assert_eq!(req.total_lessons, 1);
        assert_eq!(req.user_level, "intermediate");
        assert_eq!(req.duration_minutes, 10);
        assert!(req.speakers.is_none());
    }

    #[tokio::test]
    async fn test_generate_content_requires_topic() {
        let (state, _) = state_with(None);
        let Json(body) = generate_content(State(state), Json(content_request("  "))).await;

        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("Topic is required"));
    }

    #[tokio::test]
    async fn test_outline_uses_request_speakers_over_config() {
        const OUTLINE: &str = r#"{
            "title": "T",
            "segments": [{"name": "Hook", "size": "short"}],
            "key_takeaways": []
        }"#;
        let (mut state, _) = state_with(None);
        state.llm = Arc::new(CannedLlm(OUTLINE.to_string()));

        let req: ContentRequest = serde_json::from_value(json!({
            "topic": "Rust",
            "speakers": [{"name": "Nova", "backstory": "b", "personality": "p"}],
        }))
        .unwrap();

        let Json(body) = generate_outline_only(State(state.clone()), Json(req)).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["outline"]["speakers"][0]["name"], json!("Nova"));

        // Without the override the configured roster applies.
        let Json(body) =
            generate_outline_only(State(state), Json(content_request("Rust"))).await;
        assert_eq!(body["outline"]["speakers"][0]["name"], json!("Alex"));
    }

    #[tokio::test]
    async fn test_generate_tts_requires_text_or_transcript() {
        let (state, _) = state_with(None);
        let Json(body) = generate_tts(State(state), Json(tts_request(json!({})))).await;

        assert_eq!(body["success"], json!(false));
        assert!(body["error"].as_str().unwrap().contains("required"));
    }

    #[tokio::test]
    async fn test_generate_tts_inline_simple_mode() {
        let (state, _) = state_with(None);
        let Json(body) = generate_tts(
            State(state),
            Json(tts_request(json!({
                "text": "hello", "user_id": "u", "episode_id": "e"
            }))),
        )
        .await;

        assert_eq!(body["success"], json!(true));
        assert_eq!(body["mode"], json!("simple"));
        assert!(body["audio_base64"].is_string());
        assert!(body.get("audio_url").is_none());
    }

    #[tokio::test]
    async fn test_generate_tts_simple_mode_named_speaker() {
        let (state, speech) = state_with(None);
        generate_tts(
            State(state),
            Json(tts_request(json!({ "text": "hi", "speaker": "Sam" }))),
        )
        .await;

        let calls = speech.calls.lock().unwrap();
        // Sam's configured profile, not the default one.
        assert_eq!(calls[0].1.get("exaggeration"), Some(&0.4));
    }

    #[tokio::test]
    async fn test_generate_tts_request_voice_profiles_override() {
        let (state, speech) = state_with(None);
        generate_tts(
            State(state),
            Json(tts_request(json!({
                "transcript": [{"speaker": "Alex", "dialogue": "hello"}],
                "voice_profiles": {"Alex": {"exaggeration": 0.9}},
            }))),
        )
        .await;

        let calls = speech.calls.lock().unwrap();
        assert_eq!(calls[0].1.get("exaggeration"), Some(&0.9));
    }

    #[tokio::test]
    async fn test_generate_tts_upload_records_and_completes() {
        let store = Arc::new(MemoryStore::new());
        store.insert_episode(Episode {
            id: "ep1".to_string(),
            lesson_id: Some("l1".to_string()),
            audio_path: None,
        });
        let (state, _) = state_with(Some(store.clone()));

        let Json(body) = generate_tts(
            State(state),
            Json(tts_request(json!({
                "transcript": [{"speaker": "Alex", "dialogue": "hello"}],
                "user_id": "u1", "episode_id": "ep1",
            }))),
        )
        .await;

        assert_eq!(body["success"], json!(true));
        assert_eq!(body["mode"], json!("dialogue"));
        assert_eq!(body["storage_path"], json!("u1/ep1.wav"));
        assert!(store.object("u1/ep1.wav").is_some());

        let episode = store.read_episode("ep1").await.unwrap().unwrap();
        assert!(episode.has_audio());
        assert_eq!(
            store.lesson_status("l1"),
            Some(crate::model::LessonStatus::Completed)
        );
    }

    #[tokio::test]
    async fn test_generate_tts_upload_failure_returns_audio_inline() {
        let (mut state, _) = state_with(None);
        state.audio_store = Some(Arc::new(BrokenStore));

        let Json(body) = generate_tts(
            State(state),
            Json(tts_request(json!({
                "text": "hello", "user_id": "u", "episode_id": "e"
            }))),
        )
        .await;

        assert_eq!(body["success"], json!(true));
        assert_eq!(body["mode"], json!("simple"));
        assert!(body["audio_base64"].is_string());
        assert!(body["upload_error"]
            .as_str()
            .unwrap()
            .contains("bucket unreachable"));
    }

    #[tokio::test]
    async fn test_segment_audio_accepts_nested_segment_body() {
        // The documented request shape: transcript and title live under
        // "segment", ids and index at the top level.
        let req: SegmentAudioRequest = serde_json::from_value(json!({
            "segment": {
                "title": "Core",
                "transcript": [{"speaker": "Alex", "dialogue": "hello"}],
            },
            "user_id": "u1",
            "lesson_id": "l9",
            "segment_index": 2,
        }))
        .unwrap();
        assert_eq!(req.segment.title, "Core");
        assert_eq!(req.segment.transcript.len(), 1);

        let store = Arc::new(MemoryStore::new());
        let (state, _) = state_with(Some(store.clone()));
        let Json(body) = generate_segment_audio(State(state), Json(req)).await;

        assert_eq!(body["success"], json!(true));
        assert_eq!(body["segment_index"], json!(2));
        assert_eq!(body["segment_title"], json!("Core"));
        assert_eq!(body["turn_count"], json!(1));
        assert_eq!(body["storage_path"], json!("u1/l9_segment_2.wav"));
        assert!(store.object("u1/l9_segment_2.wav").is_some());
    }

    #[tokio::test]
    async fn test_segment_audio_requires_transcript_and_ids() {
        let (state, _) = state_with(None);

        let Json(body) = generate_segment_audio(
            State(state.clone()),
            Json(SegmentAudioRequest {
                segment: SegmentBody {
                    title: String::new(),
                    transcript: vec![],
                },
                user_id: "u".to_string(),
                lesson_id: "l".to_string(),
                segment_index: 0,
                voice_profiles: None,
            }),
        )
        .await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("No transcript in segment"));

        let Json(body) = generate_segment_audio(
            State(state),
            Json(SegmentAudioRequest {
                segment: SegmentBody {
                    title: String::new(),
                    transcript: turns(),
                },
                user_id: String::new(),
                lesson_id: "l1".to_string(),
                segment_index: 0,
                voice_profiles: None,
            }),
        )
        .await;
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn test_health_reports_feature_list() {
        let (state, _) = state_with(None);
        let Json(body) = health(State(state)).await;
        assert_eq!(body["status"], json!("healthy"));
        let features: Vec<&str> = body["features"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert!(features.contains(&"multi-speaker-dialogue"));
        assert!(!features.contains(&"storage"));

        let (state, _) = state_with(Some(Arc::new(MemoryStore::new())));
        let Json(body) = health(State(state)).await;
        let features: Vec<&str> = body["features"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert!(features.contains(&"storage"));
        assert!(features.contains(&"completion-tracking"));
    }

    #[tokio::test]
    async fn test_list_voices_exposes_profiles() {
        let (state, _) = state_with(None);
        let Json(body) = list_voices(State(state)).await;
        let voices = body["voices"].as_object().unwrap();
        assert!(voices.contains_key("Alex"));
        assert!(voices.contains_key("Sam"));
        assert!(voices.contains_key("default"));
        assert_eq!(voices["Sam"]["exaggeration"], json!(0.4));
    }
}
