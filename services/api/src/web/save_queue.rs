//! services/api/src/web/save_queue.rs
//!
//! A connection's chapter saves are written by a single task, one after another and
//! in the order the session issued them, so a slow older save can never land on top
//! of a newer one.

use pet_tales_core::{ports::DatabaseService, save::SaveRequest, session::Action};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error};

pub struct SaveQueue {
    requests: mpsc::UnboundedSender<SaveRequest>,
    writer: JoinHandle<()>,
}

impl SaveQueue {
    /// Starts the writer task. Each finished save is reported as `Action::SaveFinished`.
    pub fn start(db: Arc<dyn DatabaseService>, completions: mpsc::UnboundedSender<Action>) -> Self {
        let (requests, mut queued) = mpsc::unbounded_channel::<SaveRequest>();
        let writer = tokio::spawn(async move {
            while let Some(request) = queued.recv().await {
                let result = persist(db.as_ref(), &request).await;
                let _ = completions.send(Action::SaveFinished { result });
            }
            debug!("save queue drained");
        });
        Self { requests, writer }
    }

    pub fn push(&self, request: SaveRequest) {
        let chapter_id = request.chapter_id;
        if self.requests.send(request).is_err() {
            error!("Save queue is closed; dropping save of chapter {}", chapter_id);
        }
    }

    /// Stops taking saves and waits until every queued one has been written.
    pub async fn drain(self) {
        drop(self.requests);
        if let Err(e) = self.writer.await {
            error!("Save writer task failed: {:?}", e);
        }
    }
}

async fn persist(db: &dyn DatabaseService, request: &SaveRequest) -> Result<(), String> {
    db.update_chapter_content(request.chapter_id, &request.content, request.word_count)
        .await
        .map_err(|e| {
            error!("Failed to save chapter {}: {:?}", request.chapter_id, e);
            e.to_string()
        })
}
