pub mod animator;
pub mod auth;
pub mod cadence;
pub mod clock;
pub mod domain;
pub mod onboarding;
pub mod ports;
pub mod prompts;
pub mod save;
pub mod session;
pub mod settings;
pub mod share;
pub mod surface;
pub mod tale;
pub mod text;

pub use auth::AuthFailure;
pub use domain::{
    AuthSession, Chapter, ImagePayload, Notification, NotificationKind, Owner, PetProfile,
    PetSex, PortraitOptions, SaveStatus, TaleLength, User, UserCredentials,
};
pub use onboarding::OnboardingStep;
pub use ports::{
    DatabaseService, PortError, PortResult, PortraitService, SuggestionService, TaleService,
};
pub use session::{Action, Effect, SessionSnapshot, WritingSession};
pub use settings::EditorSettings;
