pub mod driver;
pub mod intent;
pub mod orchestrator;
pub mod sessions;
pub mod voice_flow;

pub use driver::{AbortHandle, SpeechIo, VoiceBookingDriver, VoiceCaller, VoiceRun};
pub use intent::{IntentParser, YesNo};
pub use orchestrator::BookingOrchestrator;
pub use sessions::{Awaiting, VoiceSessionService, VoiceTurn, SESSION_IDLE_MINUTES};
pub use voice_flow::{VoiceEffect, VoiceEvent, VoiceFlow, VoiceFlowState, VoiceStep};
