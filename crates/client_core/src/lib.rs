pub mod creative_studio;
pub mod live_session;
pub mod tutor;

pub use creative_studio::{CreativeStudio, GenerationRequest, StudioError};
pub use live_session::{
    LiveSessionController, LiveSessionError, LiveSessionEvent, LiveSessionRunner,
    LiveSessionSnapshot, TickOutcome,
};
pub use tutor::{moderate, ChatMessage, TutorChat, TutorError};
