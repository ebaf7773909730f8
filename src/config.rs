use std::{
    net::SocketAddr,
    num::{NonZeroU64, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_QUIZ_DURATION_SECS: u64 = 600;
pub const DEFAULT_QUIZ_QUESTION_COUNT: usize = 10;
pub const DEFAULT_LEADERBOARD_SIZE: usize = 50;

/// Runtime settings, read once at boot from the process environment
/// (after `.env` has been merged in by `dotenvy`).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bot_token: String,
    pub log_level: String,
    pub admin_names: Vec<String>,
    pub quiz_duration: Duration,
    pub quiz_question_count: usize,
    pub leaderboard_size: usize,
    pub tesseract_bin: String,
    pub ocr_languages: String,
    pub webhook: Option<Webhook>,
}

#[derive(Debug, Clone)]
pub struct Webhook {
    pub url: Url,
    pub addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let webhook = match (lookup("NGROK_URL"), lookup("NGROK_ADDR")) {
            (Some(url), Some(addr)) => Some(Webhook {
                url: parse_value("NGROK_URL", url)?,
                addr: parse_value("NGROK_ADDR", addr)?,
            }),
            _ => None,
        };

        let quiz_duration_secs = lookup("QUIZ_DURATION_SECS")
            .map(|v| parse_value("QUIZ_DURATION_SECS", v))
            .transpose()?
            .map_or(DEFAULT_QUIZ_DURATION_SECS, NonZeroU64::get);
        let quiz_question_count = lookup("QUIZ_QUESTION_COUNT")
            .map(|v| parse_value("QUIZ_QUESTION_COUNT", v))
            .transpose()?
            .map_or(DEFAULT_QUIZ_QUESTION_COUNT, NonZeroUsize::get);
        let leaderboard_size = lookup("LEADERBOARD_SIZE")
            .map(|v| parse_value("LEADERBOARD_SIZE", v))
            .transpose()?
            .map_or(DEFAULT_LEADERBOARD_SIZE, NonZeroUsize::get);

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            bot_token: required("TELOXIDE_TOKEN")?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "error".into()),
            admin_names: lookup("ADMIN_NAMES")
                .or_else(|| lookup("ADMIN_NAME"))
                .map(|v| parse_admin_names(&v))
                .unwrap_or_default(),
            quiz_duration: Duration::from_secs(quiz_duration_secs),
            quiz_question_count,
            leaderboard_size,
            tesseract_bin: lookup("TESSERACT_BIN").unwrap_or_else(|| "tesseract".into()),
            ocr_languages: lookup("OCR_LANGUAGES").unwrap_or_else(|| "eng+mal".into()),
            webhook,
        })
    }

    pub fn is_admin(&self, username: Option<&str>) -> bool {
        match username {
            Some(name) => {
                let name = name.trim_start_matches('@');
                self.admin_names.iter().any(|admin| admin == name)
            }
            None => false,
        }
    }
}

fn parse_admin_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|name| name.trim().trim_start_matches('@'))
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_value<T>(name: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
        value,
    })
}
