use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::AppConfig;
use crate::dispatch::{ChatReply, DispatchError, Dispatcher};
use crate::handlers::{NewsApiSource, WeatherApiSource};
use crate::llm::{fetch_available_models, HttpChatTransport};

mod classify;
mod config;
mod degrade;
mod dispatch;
mod handlers;
mod llm;

/// Conversational request router: classifies a message as a weather, news
/// or general question and answers it from the matching upstream.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Message to answer in one-shot mode; omit to start an interactive session
    #[arg(short, long)]
    message: Option<String>,

    /// Completion API base URL (overrides LLM_API_URL)
    #[arg(long)]
    llm_url: Option<String>,

    /// Completion API key (overrides LLM_API_KEY)
    #[arg(long)]
    llm_key: Option<String>,

    /// Preferred model name (overrides LLM_MODEL)
    #[arg(long)]
    llm_model: Option<String>,

    /// Skip the language model entirely and use keyword classification only
    #[arg(long)]
    no_llm: bool,

    /// Weather API key (overrides WEATHER_API_KEY)
    #[arg(long)]
    weather_key: Option<String>,

    /// News API key (overrides NEWS_API_KEY)
    #[arg(long)]
    news_key: Option<String>,

    /// List the models available behind the completion API and exit
    #[arg(long)]
    list_models: bool,

    /// Print replies as JSON instead of plain text
    #[arg(long)]
    json: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args.log_level)?;

    let config = resolve_config(&args);

    if args.list_models {
        return list_models(&config).await;
    }

    let dispatcher = build_dispatcher(&config)?;

    match &args.message {
        Some(message) => {
            let reply = dispatcher.respond(message).await?;
            print_reply(&reply, args.json)?;
        }
        None => run_interactive(&dispatcher, args.json).await?,
    }

    Ok(())
}

fn setup_logging(log_level: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_names(false)
        .with_ansi(true)
        .with_timer(tracing_subscriber::fmt::time::LocalTime::rfc_3339())
        .with_level(true)
        .init();

    Ok(())
}

/// Environment first, CLI flags on top. Built exactly once; everything
/// downstream takes it by reference.
fn resolve_config(args: &Args) -> AppConfig {
    let mut config = AppConfig::from_env();

    if let Some(url) = &args.llm_url {
        config.llm.api_url = url.clone();
    }
    if let Some(key) = &args.llm_key {
        config.llm.api_key = Some(key.clone());
    }
    if let Some(model) = &args.llm_model {
        config.llm.model = model.clone();
    }
    if args.no_llm {
        config.llm.disabled = true;
    }
    if let Some(key) = &args.weather_key {
        let api_url = config
            .weather
            .as_ref()
            .map(|w| w.api_url.clone())
            .unwrap_or_else(|| crate::config::DEFAULT_WEATHER_URL.to_string());
        config.weather = Some(crate::config::SourceConfig::new(api_url, key.clone()));
    }
    if let Some(key) = &args.news_key {
        let api_url = config
            .news
            .as_ref()
            .map(|n| n.api_url.clone())
            .unwrap_or_else(|| crate::config::DEFAULT_NEWS_URL.to_string());
        config.news = Some(crate::config::SourceConfig::new(api_url, key.clone()));
    }

    config
}

fn build_dispatcher(config: &AppConfig) -> Result<Dispatcher> {
    let transport = Arc::new(HttpChatTransport::new(&config.llm)?);

    let forecast = match &config.weather {
        Some(weather) => Some(Arc::new(WeatherApiSource::new(weather)?) as _),
        None => {
            info!("no weather credential configured, weather requests will degrade");
            None
        }
    };

    let headlines = match &config.news {
        Some(news) => Some(Arc::new(NewsApiSource::new(news)?) as _),
        None => {
            info!("no news credential configured, news requests will degrade");
            None
        }
    };

    Ok(Dispatcher::new(
        config.llm.clone(),
        transport,
        forecast,
        headlines,
    ))
}

async fn list_models(config: &AppConfig) -> Result<()> {
    let models = fetch_available_models(
        &config.llm.api_url,
        config.llm.api_key.as_deref(),
        config.llm.timeout,
    )
    .await
    .context("Failed to list models")?;

    if models.is_empty() {
        println!("No models available at {}", config.llm.api_url);
        return Ok(());
    }

    println!("Available models:");
    for (i, model) in models.iter().enumerate() {
        println!("{}. {}", i + 1, model);
    }
    Ok(())
}

async fn run_interactive(dispatcher: &Dispatcher, json: bool) -> Result<()> {
    println!("concierge ready — ask about the weather, the news, or anything else (\"exit\" to quit)");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        match dispatcher.respond(line).await {
            Ok(reply) => print_reply(&reply, json)?,
            Err(DispatchError::EmptyMessage) => eprintln!("Please type a message."),
        }
    }

    Ok(())
}

fn print_reply(reply: &ChatReply, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(reply)?);
    } else {
        println!("{}", reply.reply);
    }
    Ok(())
}
