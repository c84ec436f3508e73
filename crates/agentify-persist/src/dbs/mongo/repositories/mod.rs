mod llm_config;
mod message;
mod session;
mod thread;
mod tool_server;
mod user;

pub use llm_config::MongoLlmConfigRepository;
pub use message::MongoMessageRepository;
pub use session::MongoSessionRepository;
pub use thread::MongoThreadRepository;
pub use tool_server::MongoToolServerRepository;
pub use user::MongoUserRepository;

use mongodb::error::{Error, ErrorKind, WriteFailure};

const DUPLICATE_KEY: i32 = 11000;

pub(crate) fn is_duplicate_key(err: &Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}
