pub mod api;
pub mod app;
pub mod cli;
pub mod conversation;
pub mod error;
pub mod models;
pub mod realtime;
pub mod render;
pub mod session;
pub mod shell;
pub mod store;

pub use app::run;
pub use error::{ ChatError, ChatResult };
