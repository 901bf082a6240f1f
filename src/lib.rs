pub mod commands;
pub mod components;
pub mod config;
pub mod dashboard;
pub mod data;
pub mod handlers;
pub mod logging;
pub mod moderation;
pub mod policy;
pub mod stats;
pub mod store;
pub mod tickets;
pub mod verify;

pub const BOT_NAME: &str = "warden";
pub const COMMAND_TARGET: &str = "warden::command";
pub const ERROR_TARGET: &str = "warden::error";
pub const EVENT_TARGET: &str = "warden::handlers";
pub const MODERATION_TARGET: &str = "warden::moderation";
pub const CONSOLE_TARGET: &str = "warden";

pub use data::{Data, DataInner};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
