//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! The connection task owns the writing session: client messages, due timers and
//! finished provider calls are applied to it one at a time, in arrival order.

use crate::{
    error::ApiError,
    web::{
        protocol::{ClientMessage, ServerMessage},
        save_queue::SaveQueue,
        state::{load_story, AppState},
    },
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use pet_tales_core::{
    domain::{default_chapter_name, next_sort_order, Chapter, Notification, PetProfile},
    session::{Action, ChapterSummary, Effect, WritingSession},
};
use std::sync::Arc;
use tokio::{
    sync::mpsc,
    time::{sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The handler for upgrading authenticated HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, Some(user_id)))
}

/// Signed-out visitors get a scratch editor that is never saved.
pub async fn guest_ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, None))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user_id: Option<Uuid>) {
    match user_id {
        Some(id) => info!("New writing session for user: {}", id),
        None => info!("New guest writing session"),
    }

    let (sender, mut receiver) = socket.split();
    let (completions, mut completed) = mpsc::unbounded_channel();

    // --- 1. Initialization Phase ---
    let session = match open_session(&app_state, user_id).await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to load writing session: {:?}", e);
            let mut sender = sender;
            let err_msg = ServerMessage::Error {
                message: "Failed to load your story.".to_string(),
            };
            if let Ok(json) = serde_json::to_string(&err_msg) {
                let _ = sender.send(Message::Text(json.into())).await;
            }
            return;
        }
    };

    let mut conn = Connection {
        saves: SaveQueue::start(app_state.db.clone(), completions.clone()),
        app_state,
        user_id,
        session,
        started: Instant::now(),
        sender,
        completions,
        cancel: CancellationToken::new(),
    };

    let snapshot = conn.session.snapshot();
    if let Err(e) = conn.send(&ServerMessage::SessionReady { snapshot }).await {
        error!("Failed to send session snapshot: {:?}", e);
        return;
    }

    // --- 2. Main Loop ---
    loop {
        let deadline = conn.session.next_deadline().map(|d| conn.started + d);
        let step = tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => conn.handle_text(text.as_str()).await,
                Some(Ok(Message::Close(_))) => {
                    info!("Client sent close message.");
                    break;
                }
                Some(Ok(_)) => Ok(()),
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
                None => {
                    info!("Client disconnected.");
                    break;
                }
            },
            Some(action) = completed.recv() => conn.apply(action).await,
            _ = wait_for(deadline) => conn.advance().await,
        };
        if let Err(e) = step {
            error!("Writing session failed: {:?}", e);
            break;
        }
    }

    // --- 3. Cleanup ---
    conn.close().await;
    info!("WebSocket connection closed.");
}

async fn open_session(
    app_state: &AppState,
    user_id: Option<Uuid>,
) -> Result<WritingSession, ApiError> {
    let settings = app_state.config.editor;
    let Some(user_id) = user_id else {
        return Ok(WritingSession::guest(settings));
    };
    let story = load_story(app_state.db.as_ref(), user_id).await?;
    WritingSession::signed_in(user_id, story.chapters, story.profile, settings)
        .ok_or(ApiError::StoryUnavailable(user_id))
}

/// Sleeps until `deadline`, or forever when there is none.
async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// One connected editor.
struct Connection {
    app_state: Arc<AppState>,
    user_id: Option<Uuid>,
    session: WritingSession,
    /// Origin of the session's virtual clock.
    started: Instant,
    sender: SplitSink<WebSocket, Message>,
    completions: mpsc::UnboundedSender<Action>,
    /// Cancels in-flight suggestion requests when the connection goes away.
    cancel: CancellationToken,
    saves: SaveQueue,
}

impl Connection {
    async fn send(&mut self, msg: &ServerMessage) -> Result<(), ApiError> {
        let json = serde_json::to_string(msg)?;
        self.sender.send(Message::Text(json.into())).await?;
        Ok(())
    }

    async fn notify(&mut self, notification: Notification) -> Result<(), ApiError> {
        self.send(&ServerMessage::Notification { notification }).await
    }

    async fn apply(&mut self, action: Action) -> Result<(), ApiError> {
        let effects = self.session.apply(action, self.started.elapsed());
        self.dispatch(effects).await
    }

    async fn advance(&mut self) -> Result<(), ApiError> {
        let effects = self.session.advance(self.started.elapsed());
        self.dispatch(effects).await
    }

    async fn dispatch(&mut self, effects: Vec<Effect>) -> Result<(), ApiError> {
        for effect in effects {
            match effect {
                Effect::FetchSuggestions {
                    request_id,
                    story,
                    profile,
                } => self.spawn_fetch(request_id, story, profile),
                Effect::Persist(request) => self.saves.push(request),
                other => {
                    if let Some(msg) = ServerMessage::from_effect(other) {
                        self.send(&msg).await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle_text(&mut self, text: &str) -> Result<(), ApiError> {
        let msg = match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Failed to deserialize client message: {}", e);
                return Ok(());
            }
        };
        match msg {
            ClientMessage::AddChapter { name } => self.add_chapter(name).await,
            ClientMessage::RenameChapter { chapter_id, name } => {
                self.rename_chapter(chapter_id, name).await
            }
            ClientMessage::SaveProfile { profile } => self.save_profile(profile).await,
            other => match other.into_action() {
                Some(action) => self.apply(action).await,
                None => Ok(()),
            },
        }
    }

    //-------------------------------------------------------------------------------------
    // Provider calls
    //-------------------------------------------------------------------------------------

    fn spawn_fetch(&self, request_id: u64, story: String, profile: PetProfile) {
        let suggestions = self.app_state.suggestions.clone();
        let completions = self.completions.clone();
        let token = self.cancel.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                _ = token.cancelled() => {
                    debug!(request_id, "suggestion request cancelled");
                    return;
                }
                result = suggestions.suggest_continuations(&story, &profile) => result,
            };
            let action = match result {
                Ok(suggestions) => Action::SuggestionsReady {
                    request_id,
                    suggestions,
                },
                Err(e) => Action::SuggestionsFailed {
                    request_id,
                    reason: e.to_string(),
                },
            };
            let _ = completions.send(action);
        });
    }

    //-------------------------------------------------------------------------------------
    // Database-backed commands
    //-------------------------------------------------------------------------------------

    async fn add_chapter(&mut self, name: Option<String>) -> Result<(), ApiError> {
        let Some(user_id) = self.user_id else {
            warn!("Guest tried to add a chapter");
            return Ok(());
        };
        let chapters = self.session.chapters();
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| default_chapter_name(chapters.len()));
        let chapter = Chapter::new(user_id, name, next_sort_order(chapters));

        match self.app_state.db.create_chapter(&chapter).await {
            Ok(created) => {
                info!("Chapter {} added for user {}", created.id, user_id);
                self.apply(Action::ChapterAdded(created)).await?;
                self.send_chapters().await
            }
            Err(e) => {
                error!("Failed to add chapter: {:?}", e);
                self.notify(Notification::error(format!("Could not add chapter: {}", e)))
                    .await
            }
        }
    }

    async fn rename_chapter(&mut self, chapter_id: Uuid, name: String) -> Result<(), ApiError> {
        if self.user_id.is_none() {
            warn!("Guest tried to rename a chapter");
            return Ok(());
        }
        if !self.session.chapters().iter().any(|c| c.id == chapter_id) {
            warn!("Rename of unknown chapter {}", chapter_id);
            return Ok(());
        }
        let name = name.trim().to_string();
        match self.app_state.db.rename_chapter(chapter_id, &name).await {
            Ok(()) => {
                self.apply(Action::ChapterRenamed { chapter_id, name }).await?;
                self.send_chapters().await
            }
            Err(e) => {
                error!("Failed to rename chapter: {:?}", e);
                self.notify(Notification::error(format!("Failed to update name: {}", e)))
                    .await
            }
        }
    }

    async fn save_profile(&mut self, profile: PetProfile) -> Result<(), ApiError> {
        let Some(user_id) = self.user_id else {
            warn!("Guest tried to save a pet profile");
            return Ok(());
        };
        match self.app_state.db.upsert_profile(user_id, &profile).await {
            Ok(()) => self.apply(Action::ProfileSaved(profile)).await,
            Err(e) => {
                error!("Failed to save pet profile: {:?}", e);
                self.notify(Notification::error(format!(
                    "Could not save pet profile: {}",
                    e
                )))
                .await
            }
        }
    }

    async fn send_chapters(&mut self) -> Result<(), ApiError> {
        let chapters = self
            .session
            .chapters()
            .iter()
            .map(ChapterSummary::from)
            .collect();
        self.send(&ServerMessage::ChaptersChanged { chapters }).await
    }

    //-------------------------------------------------------------------------------------
    // Teardown
    //-------------------------------------------------------------------------------------

    /// Cancels provider calls, queues the final flush behind any earlier saves and
    /// waits for all of them to be written.
    async fn close(mut self) {
        self.cancel.cancel();
        let effects = self.session.apply(Action::Teardown, self.started.elapsed());
        for effect in effects {
            if let Effect::Persist(request) = effect {
                self.saves.push(request);
            }
        }
        self.saves.drain().await;
        let _ = self.sender.close().await;
    }
}
