pub mod events;
pub mod fanout;
pub mod gate;
pub mod presence;
pub mod server;
pub mod session;
