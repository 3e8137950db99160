use std::sync::Arc;

use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use tagtool_core::config::ServiceConfig;
use tagtool_core::llm::{Completer, LlmClient};
use tagtool_core::sections::{SectionRegistry, load_registry};
use tagtool_core::wiki::{HttpWikiClient, WikiApi};

mod handlers;

use handlers::AppState;

#[derive(Debug, Parser)]
#[command(
    name = "tagtool",
    version,
    about = "AI tagging orchestration service between the wiki and a language model"
)]
struct Cli {
    #[arg(long, value_name = "ADDR", help = "Bind address; overrides TAGTOOL_BIND")]
    bind: Option<String>,
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let cli = Cli::parse();
    let config = ServiceConfig::from_env()?;
    let bind = cli.bind.unwrap_or_else(|| config.bind.clone());

    let registry = match &config.sections_file {
        Some(path) => Arc::new(load_registry(path)?),
        None => Arc::new(SectionRegistry::default()),
    };
    let wiki: Arc<dyn WikiApi> = Arc::new(HttpWikiClient::new(&config)?);
    let llm: Option<Arc<dyn Completer>> = if config.llm_api_key.is_some() {
        Some(Arc::new(LlmClient::new(&config)?))
    } else {
        log::warn!("LLM_API_KEY is not set; summary and tagging endpoints are disabled");
        None
    };

    if !config.allow_writes {
        info!("write gate closed: every bulk operation runs as dry-run");
    }
    info!("listening on {bind} (wiki backend {})", config.wiki_base_url);

    let state = AppState {
        config,
        registry,
        wiki,
        llm,
    };

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(state.clone()))
            .route("/healthz", web::get().to(handlers::healthz))
            .route("/spaces", web::get().to(handlers::list_spaces))
            .route("/spaces/meta", web::get().to(handlers::space_meta))
            .route(
                "/bulk/reset-tags/{space_key}",
                web::post().to(handlers::bulk_reset),
            )
            .route("/bulk/tag/{root_id}", web::post().to(handlers::bulk_tag))
            .route(
                "/pages/{page_id}/summary",
                web::post().to(handlers::page_summary),
            )
    })
    .bind(&bind)
    .with_context(|| format!("failed to bind {bind}"))?
    .run()
    .await
    .context("server terminated abnormally")
}
