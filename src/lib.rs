use state::QuizState;
use teloxide::{dispatching::dialogue::InMemStorage, prelude::Dialogue};

pub mod account;
pub mod analytics;
pub mod commands;
pub mod config;
pub mod constructor;
pub mod database;
pub mod editor;
pub mod error;
pub mod import;
pub mod importer;
pub mod keyboard;
pub mod leaderboard;
pub mod runner;
pub mod schema;
pub mod session;
pub mod state;
pub mod validation;

type UserDialogue = Dialogue<QuizState, InMemStorage<QuizState>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync + 'static>>;
