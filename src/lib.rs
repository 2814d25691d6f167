//! Fetch a web document, have a language model explain it at the reader's
//! level, and keep the conversation going with follow-up questions.

pub mod ai;
pub mod app;
pub mod config;
pub mod conversation;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod settings;

pub use app::App;
pub use error::{AppError, Result, StartError};
