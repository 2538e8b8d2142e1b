use crate::config::StorageConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::model::{Episode, LessonStatus};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

/// Object storage for finished audio artifacts. Persisting to an existing
/// path overwrites it, so regeneration never duplicates objects.
#[async_trait]
pub trait AudioStore: Send + Sync {
    /// Stores the bytes at `path` and returns a public URL.
    async fn persist_audio(&self, path: &str, bytes: &[u8]) -> PipelineResult<String>;
}

/// Relational access to episode rows and their parent lesson-plan status.
#[async_trait]
pub trait EpisodeStore: Send + Sync {
    async fn read_episode(&self, episode_id: &str) -> PipelineResult<Option<Episode>>;
    async fn list_episodes(&self, lesson_id: &str) -> PipelineResult<Vec<Episode>>;
    async fn set_episode_audio(&self, episode_id: &str, audio_url: &str) -> PipelineResult<()>;
    /// Must be idempotent; the completion tracker may re-confirm a status.
    async fn update_lesson_status(
        &self,
        lesson_id: &str,
        status: LessonStatus,
    ) -> PipelineResult<()>;
}

// --- Supabase-style REST backend ---

pub struct SupabaseStore {
    base_url: String,
    service_key: String,
    bucket: String,
    client: reqwest::Client,
}

impl SupabaseStore {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            bucket: config.bucket.clone(),
            client: reqwest::Client::new(),
        })
    }

    fn rest(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path)
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", &self.service_key))
    }
}

#[async_trait]
impl AudioStore for SupabaseStore {
    async fn persist_audio(&self, path: &str, bytes: &[u8]) -> PipelineResult<String> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path);
        let resp = self
            .auth(self.client.post(&url))
            .header("Content-Type", "audio/wav")
            .header("x-upsert", "true")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Storage(format!(
                "audio upload failed ({}): {}",
                status, body
            )));
        }

        Ok(format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        ))
    }
}

#[async_trait]
impl EpisodeStore for SupabaseStore {
    async fn read_episode(&self, episode_id: &str) -> PipelineResult<Option<Episode>> {
        let url = self.rest(&format!(
            "episodes?id=eq.{}&select=id,lesson_id,audio_path",
            episode_id
        ));
        let resp = self
            .auth(self.client.get(&url))
            .send()
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PipelineError::Storage(format!(
                "episode lookup failed: {}",
                resp.status()
            )));
        }

        let mut rows: Vec<Episode> = resp
            .json()
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    async fn list_episodes(&self, lesson_id: &str) -> PipelineResult<Vec<Episode>> {
        let url = self.rest(&format!(
            "episodes?lesson_id=eq.{}&select=id,lesson_id,audio_path",
            lesson_id
        ));
        let resp = self
            .auth(self.client.get(&url))
            .send()
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PipelineError::Storage(format!(
                "episode listing failed: {}",
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))
    }

    async fn set_episode_audio(&self, episode_id: &str, audio_url: &str) -> PipelineResult<()> {
        let url = self.rest(&format!("episodes?id=eq.{}", episode_id));
        let resp = self
            .auth(self.client.patch(&url))
            .json(&json!({ "audio_path": audio_url }))
            .send()
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PipelineError::Storage(format!(
                "episode update failed: {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn update_lesson_status(
        &self,
        lesson_id: &str,
        status: LessonStatus,
    ) -> PipelineResult<()> {
        let url = self.rest(&format!("plan_lessons?id=eq.{}", lesson_id));
        let resp = self
            .auth(self.client.patch(&url))
            .json(&json!({ "status": status.as_str() }))
            .send()
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PipelineError::Storage(format!(
                "lesson status update failed: {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

// --- In-memory backend (tests and local runs without storage) ---

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryStore {
    episodes: Mutex<HashMap<String, Episode>>,
    lesson_status: Mutex<HashMap<String, LessonStatus>>,
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_episode(&self, episode: Episode) {
        if let Some(lesson_id) = &episode.lesson_id {
            self.lesson_status
                .lock()
                .unwrap()
                .entry(lesson_id.clone())
                .or_insert(LessonStatus::Pending);
        }
        self.episodes
            .lock()
            .unwrap()
            .insert(episode.id.clone(), episode);
    }

    pub fn lesson_status(&self, lesson_id: &str) -> Option<LessonStatus> {
        self.lesson_status.lock().unwrap().get(lesson_id).copied()
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(path).cloned()
    }
}

#[async_trait]
impl AudioStore for MemoryStore {
    async fn persist_audio(&self, path: &str, bytes: &[u8]) -> PipelineResult<String> {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), bytes.to_vec());
        Ok(format!("memory://{}", path))
    }
}

#[async_trait]
impl EpisodeStore for MemoryStore {
    async fn read_episode(&self, episode_id: &str) -> PipelineResult<Option<Episode>> {
        Ok(self.episodes.lock().unwrap().get(episode_id).cloned())
    }

    async fn list_episodes(&self, lesson_id: &str) -> PipelineResult<Vec<Episode>> {
        Ok(self
            .episodes
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.lesson_id.as_deref() == Some(lesson_id))
            .cloned()
            .collect())
    }

    async fn set_episode_audio(&self, episode_id: &str, audio_url: &str) -> PipelineResult<()> {
        if let Some(episode) = self.episodes.lock().unwrap().get_mut(episode_id) {
            episode.audio_path = Some(audio_url.to_string());
        }
        Ok(())
    }

    async fn update_lesson_status(
        &self,
        lesson_id: &str,
        status: LessonStatus,
    ) -> PipelineResult<()> {
        self.lesson_status
            .lock()
            .unwrap()
            .insert(lesson_id.to_string(), status);
        Ok(())
    }
}
