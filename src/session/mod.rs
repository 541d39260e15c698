pub mod loop_worker;
pub mod orchestrator;
pub mod state;

pub use loop_worker::{parse_keyboard, run_frame_loop};
pub use orchestrator::{FrameOutcome, SessionOrchestrator};
pub use state::{ControlAction, Session, SessionStatus};
