use crate::error::PipelineResult;
use crate::model::LessonStatus;
use crate::store::EpisodeStore;
use log::{info, warn};
use std::sync::Arc;

/// Marks a lesson completed once every one of its episodes has audio.
///
/// The check runs after every upload and the status write is unconditional,
/// so two uploads racing on the last two episodes at worst both write the
/// same terminal status. Status never moves backwards.
pub struct CompletionTracker {
    store: Arc<dyn EpisodeStore>,
}

impl CompletionTracker {
    pub fn new(store: Arc<dyn EpisodeStore>) -> Self {
        Self { store }
    }

    /// Re-evaluates the parent lesson of `episode_id`. Unknown episodes and
    /// episodes without a lesson are no-ops, not errors.
    pub async fn on_audio_uploaded(&self, episode_id: &str) -> PipelineResult<()> {
        let episode = match self.store.read_episode(episode_id).await? {
            Some(episode) => episode,
            None => {
                warn!("Completion check skipped: episode {} not found", episode_id);
                return Ok(());
            }
        };

        let lesson_id = match &episode.lesson_id {
            Some(id) => id,
            None => {
                warn!(
                    "Completion check skipped: episode {} has no lesson",
                    episode_id
                );
                return Ok(());
            }
        };

        let episodes = self.store.list_episodes(lesson_id).await?;
        if episodes.is_empty() {
            return Ok(());
        }

        let done = episodes.iter().filter(|e| e.has_audio()).count();
        if done < episodes.len() {
            info!(
                "Lesson {}: {}/{} episodes have audio",
                lesson_id,
                done,
                episodes.len()
            );
            return Ok(());
        }

        info!("Lesson {} complete ({} episodes)", lesson_id, done);
        self.store
            .update_lesson_status(lesson_id, LessonStatus::Completed)
            .await
    }
}
