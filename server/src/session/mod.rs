pub mod manager;
pub mod retry;
pub mod state;

pub use manager::{
    ManagerSettings, SendError, SentMessage, SessionManager, StartError, StartOutcome,
};
pub use retry::RetryPolicy;
pub use state::{Session, SessionPhase, SessionSnapshot, normalize_address};
