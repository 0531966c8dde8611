//! Host binary: wires the broker, workers, and remote clients together and
//! exposes a small line-oriented console for trying the operations out.

mod dispatcher;

use anyhow::{bail, Result};
use async_trait::async_trait;
use broker::{Broker, Endpoint, MpscChannel};
use dispatcher::Dispatcher;
use providers::{
    GenerationPipeline, IdentityClient, LocalEngine, RemoteCompletionClient, RetrievalClient,
    SimulationEngine,
};
use services::FileStore;
use shared::settings::AssistantSettings;
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const REDIRECT_URI: &str = "https://tab-sidekick.invalid/redirect.html";

/// Stands in until an on-device model is bundled; every load attempt fails,
/// which keeps the broker routing generations to the simulation fallback.
struct NoLocalModel;

#[async_trait]
impl GenerationPipeline for NoLocalModel {
    async fn load(&self, _progress: &(dyn Fn(u8) + Send + Sync)) -> Result<()> {
        bail!("no on-device model available")
    }

    async fn generate(
        &self,
        _prompt: &str,
        _on_token: &(dyn Fn(&str) + Send + Sync),
    ) -> Result<()> {
        bail!("no on-device model available")
    }
}

fn load_settings() -> AssistantSettings {
    let Some(path) = std::env::var_os("TAB_SIDEKICK_CONFIG") else {
        return AssistantSettings::default();
    };
    let loaded = std::fs::read_to_string(&path)
        .map_err(anyhow::Error::from)
        .and_then(|raw| serde_json::from_str(&raw).map_err(anyhow::Error::from));
    match loaded {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(error = %e, "could not load settings file; using defaults");
            AssistantSettings::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings();
    let store = Arc::new(FileStore::new()?);

    let channel = Arc::new(MpscChannel::new());
    let broker = Arc::new(Broker::new(channel.clone() as Arc<dyn broker::Channel>));

    // Worker endpoints reply to the broker over the same channel.
    let (broker_tx, mut broker_rx) = mpsc::unbounded_channel();
    channel.register(Endpoint::Broker, broker_tx.clone());

    let (worker_tx, mut worker_rx) = mpsc::unbounded_channel();
    channel.register(Endpoint::Worker, worker_tx);
    let local = Arc::new(LocalEngine::new(broker_tx.clone(), Box::new(NoLocalModel)));
    let local_loop = local.clone();
    tokio::spawn(async move {
        while let Some(msg) = worker_rx.recv().await {
            local_loop.handle(msg).await;
        }
    });

    let (fallback_tx, mut fallback_rx) = mpsc::unbounded_channel();
    channel.register(Endpoint::Fallback, fallback_tx);
    let simulation = SimulationEngine::new(broker_tx);
    tokio::spawn(async move {
        while let Some(msg) = fallback_rx.recv().await {
            simulation.handle(msg).await;
        }
    });

    let broker_loop = broker.clone();
    tokio::spawn(async move {
        while let Some(msg) = broker_rx.recv().await {
            broker_loop.handle_message(msg);
        }
    });

    local.initialize().await;

    let remote = settings.remote.clone();
    let dispatcher = Dispatcher::new(
        settings,
        Arc::new(RemoteCompletionClient::new(&remote.completion_url)),
        RetrievalClient::new(&remote.retrieval_query_url, &remote.ingest_url),
        IdentityClient::new(&remote.token_url, &remote.client_id, REDIRECT_URI),
        broker.clone(),
        store,
    );

    info!("tab-sidekick host ready; type a question, or /quit");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/incognito on" => {
                dispatcher.set_incognito(true)?;
                println!("incognito enabled");
            }
            "/incognito off" => {
                dispatcher.set_incognito(false)?;
                println!("incognito disabled");
            }
            _ => {
                let answer = if let Some(text) = line.strip_prefix("/summarize ") {
                    dispatcher.summarize(text).await
                } else if let Some(text) = line.strip_prefix("/highlights ") {
                    dispatcher.highlights(text).await
                } else {
                    dispatcher.ask(line, &[], false, &[]).await
                };
                match answer {
                    Ok(text) => println!("{text}"),
                    Err(e) => println!("error: {e}"),
                }
            }
        }
    }

    broker.shutdown();
    Ok(())
}
