pub mod message;
pub mod session;

pub use message::{ChatMessage, ChatRole};
pub use session::{Session, SessionStatus};
