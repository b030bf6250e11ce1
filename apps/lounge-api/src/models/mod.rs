pub mod chat_session;
pub mod message;
pub mod room;
pub mod user;
