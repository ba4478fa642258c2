//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser editor and the API
//! server. Client messages become session actions; session effects become server
//! messages.

use pet_tales_core::{
    animator::HighlightPlan,
    cadence::CycleProgress,
    domain::{Notification, PetProfile, SaveStatus},
    onboarding::OnboardingStep,
    session::{Action, ChapterSummary, Effect, SessionSnapshot},
    surface::{ImageToolbar, SelectionRange},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// The full markup of the editor after the writer typed.
    ContentEdited { content: String },
    SelectionChanged { start: usize, end: usize },
    /// Embed an image, usually a `data:` URL read from a picked file.
    InsertImage { src: String },
    SelectImage { image_id: String, top: f64, left: f64 },
    DismissImageToolbar,
    RotateImage,
    DeleteImage,
    /// Zero-based index of the chosen suggestion.
    SelectSuggestion { index: usize },
    SkipSuggestions,
    Blur,
    SwitchChapter { chapter_id: Uuid },

    // These need the database before the session hears about them.
    AddChapter { name: Option<String> },
    RenameChapter { chapter_id: Uuid, name: String },
    SaveProfile { profile: PetProfile },
}

impl ClientMessage {
    /// The session action for messages that go straight to the session. `None` for
    /// the messages that are handled by the connection first.
    pub fn into_action(self) -> Option<Action> {
        let action = match self {
            ClientMessage::ContentEdited { content } => Action::ContentEdited { content },
            ClientMessage::SelectionChanged { start, end } => {
                Action::SelectionChanged(SelectionRange { start, end })
            }
            ClientMessage::InsertImage { src } => Action::InsertImage { src },
            ClientMessage::SelectImage {
                image_id,
                top,
                left,
            } => Action::SelectImage {
                image_id,
                top,
                left,
            },
            ClientMessage::DismissImageToolbar => Action::DismissImageToolbar,
            ClientMessage::RotateImage => Action::RotateImage,
            ClientMessage::DeleteImage => Action::DeleteImage,
            ClientMessage::SelectSuggestion { index } => Action::SelectSuggestion(index),
            ClientMessage::SkipSuggestions => Action::SkipSuggestions,
            ClientMessage::Blur => Action::Blur,
            ClientMessage::SwitchChapter { chapter_id } => Action::SwitchChapter(chapter_id),
            ClientMessage::AddChapter { .. }
            | ClientMessage::RenameChapter { .. }
            | ClientMessage::SaveProfile { .. } => return None,
        };
        Some(action)
    }
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once the session is loaded; the client renders everything from it.
    SessionReady { snapshot: SessionSnapshot },

    /// A transient toast.
    Notification { notification: Notification },

    /// Replace the editor content with the authoritative markup.
    ContentReplaced { chapter_id: Uuid, content: String },
    ActiveChapterChanged { chapter_id: Uuid, content: String },
    ChaptersChanged { chapters: Vec<ChapterSummary> },

    Progress { progress: CycleProgress },
    SaveStatus { status: SaveStatus },
    LockChanged { locked: bool },

    SuggestionsLoading,
    SuggestionsShown { suggestions: [String; 2] },
    SuggestionsCleared,

    HighlightStarted { plan: HighlightPlan },
    HighlightWave,
    /// The highlight ended; the client moves the caret to the end.
    HighlightFinished,

    ImageToolbarShown { toolbar: ImageToolbar },
    ImageToolbarHidden,

    OnboardingChanged { step: OnboardingStep, number: u8 },

    /// Reports a fatal error to the client, which should display an error message.
    Error { message: String },
}

impl ServerMessage {
    /// The message a client should see for `effect`. Work the server carries out
    /// itself (provider calls, persistence) has no message.
    pub fn from_effect(effect: Effect) -> Option<Self> {
        let msg = match effect {
            Effect::FetchSuggestions { .. } | Effect::Persist(_) => return None,
            Effect::Notify(notification) => ServerMessage::Notification { notification },
            Effect::ContentReplaced {
                chapter_id,
                content,
            } => ServerMessage::ContentReplaced {
                chapter_id,
                content,
            },
            Effect::ActiveChapterChanged {
                chapter_id,
                content,
            } => ServerMessage::ActiveChapterChanged {
                chapter_id,
                content,
            },
            Effect::Progress(progress) => ServerMessage::Progress { progress },
            Effect::SaveStatusChanged(status) => ServerMessage::SaveStatus { status },
            Effect::LockChanged(locked) => ServerMessage::LockChanged { locked },
            Effect::SuggestionsLoading => ServerMessage::SuggestionsLoading,
            Effect::SuggestionsShown(suggestions) => {
                ServerMessage::SuggestionsShown { suggestions }
            }
            Effect::SuggestionsCleared => ServerMessage::SuggestionsCleared,
            Effect::HighlightStarted(plan) => ServerMessage::HighlightStarted { plan },
            Effect::HighlightWave => ServerMessage::HighlightWave,
            Effect::HighlightFinished => ServerMessage::HighlightFinished,
            Effect::ImageToolbarShown(toolbar) => ServerMessage::ImageToolbarShown { toolbar },
            Effect::ImageToolbarHidden => ServerMessage::ImageToolbarHidden,
            Effect::OnboardingChanged(step) => ServerMessage::OnboardingChanged {
                number: step.number(),
                step,
            },
        };
        Some(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pet_tales_core::save::SaveRequest;

    #[test]
    fn client_messages_are_tagged_by_type() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"select_suggestion","index":1}"#).unwrap();
        assert_eq!(msg.into_action(), Some(Action::SelectSuggestion(1)));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"selection_changed","start":3,"end":7}"#).unwrap();
        assert_eq!(
            msg.into_action(),
            Some(Action::SelectionChanged(SelectionRange { start: 3, end: 7 }))
        );

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"skip_suggestions"}"#).unwrap();
        assert_eq!(msg.into_action(), Some(Action::SkipSuggestions));
    }

    #[test]
    fn database_backed_messages_have_no_direct_action() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"add_chapter","name":null}"#).unwrap();
        assert_eq!(msg, ClientMessage::AddChapter { name: None });
        assert!(msg.into_action().is_none());
    }

    #[test]
    fn host_work_is_not_sent_to_clients() {
        let persist = Effect::Persist(SaveRequest {
            chapter_id: Uuid::nil(),
            content: "hi".into(),
            word_count: 1,
        });
        assert!(ServerMessage::from_effect(persist).is_none());
    }

    #[test]
    fn server_messages_serialize_with_snake_case_tags() {
        let msg = ServerMessage::from_effect(Effect::SuggestionsShown([
            "one".to_string(),
            "two".to_string(),
        ]))
        .unwrap();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "suggestions_shown");
        assert_eq!(json["suggestions"][1], "two");

        let msg = ServerMessage::from_effect(Effect::OnboardingChanged(
            OnboardingStep::FirstWords,
        ))
        .unwrap();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["step"], "first_words");
        assert_eq!(json["number"], 3);
    }
}
