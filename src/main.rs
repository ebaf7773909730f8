use std::{error::Error, sync::Arc};

use dotenvy::dotenv;
use quizdeck::{
    config::Config, database::connection::Connection, import::ocr::TesseractCli, schema::schema,
    session::FinishClaims, state::QuizState,
};
use teloxide::{
    dispatching::dialogue::InMemStorage,
    error_handlers::IgnoringErrorHandlerSafe,
    prelude::*,
    update_listeners::webhooks::{self, Options},
};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;

type BoxError = Box<dyn Error + Send + Sync + 'static>;

fn init_tracing(level: &str) -> Result<(), BoxError> {
    let level: tracing::Level = level.parse()?;
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from_level(level))
        .json()
        .with_span_events(FmtSpan::ENTER)
        .log_internal_errors(true)
        .with_line_number(true)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    // teloxide logs through `log`
    tracing_log::LogTracer::init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenv().ok();
    let config = Config::from_env()?;
    init_tracing(&config.log_level)?;

    let connection = Arc::new(Connection::connect(&config.database_url).await?);
    connection.migrate().await?;
    tracing::info!("Database is ready");

    let recognizer = Arc::new(TesseractCli::new(
        config.tesseract_bin.clone(),
        config.ocr_languages.clone(),
    ));
    let bot = Bot::new(config.bot_token.clone());
    let webhook = config.webhook.clone();
    let config = Arc::new(config);
    tracing::info!("Starting bot...");

    let mut dispatcher = Dispatcher::builder(bot.clone(), schema())
        .dependencies(dptree::deps![
            InMemStorage::<QuizState>::new(),
            connection,
            config,
            recognizer,
            Arc::new(FinishClaims::default())
        ])
        .enable_ctrlc_handler()
        .build();

    match webhook {
        Some(webhook) => {
            tracing::info!(url = %webhook.url, addr = %webhook.addr, "Listening for webhooks");
            let listener = webhooks::axum(bot, Options::new(webhook.addr, webhook.url)).await?;
            dispatcher
                .dispatch_with_listener(listener, Arc::new(IgnoringErrorHandlerSafe))
                .await
        }
        None => dispatcher.dispatch().await,
    }

    Ok(())
}
