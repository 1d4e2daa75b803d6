use std::sync::Arc;

use ai_client::{ChatClient, ChatClientConfig};
use backend_api::{run_server, AppState};
use bank_client::{BankClient, BankClientConfig};
use classifier::DeductionClassifier;
use ingest::IngestPipeline;
use settings_loader::Settings;
use storage::{RestAccountRepository, RestClient, RestTransactionRepository, RestUserRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;

    println!("WriteOff API Server");
    println!("===================");
    println!("Bank API: {}", settings.bank.base_url);
    println!("AI endpoint: {} (model: {})", settings.ai.base_url, settings.ai.model);
    println!("Storage: {}", settings.storage.base_url);
    println!("Listening on: {}:{}", settings.server.host, settings.server.port);
    println!();

    let bank = Arc::new(BankClient::new(BankClientConfig {
        base_url: settings.bank.base_url.clone(),
        client_id: settings.bank.client_id.clone(),
        secret: settings.bank.secret.clone(),
    })?);

    let chat = ChatClient::new(ChatClientConfig {
        base_url: settings.ai.base_url.clone(),
        api_key: settings.ai.api_key.clone(),
        model: settings.ai.model.clone(),
    })?;
    let classifier = Arc::new(DeductionClassifier::new(Arc::new(chat)));

    // Privileged client for server-side reads and writes; the public client
    // only backs the user-lookup fallback.
    let (primary_key, fallback_key) = match &settings.storage.service_key {
        Some(service_key) => (service_key.clone(), Some(settings.storage.anon_key.clone())),
        None => (settings.storage.anon_key.clone(), None),
    };
    let primary = RestClient::new(&settings.storage.base_url, &primary_key)?;
    let fallback = fallback_key
        .map(|key| RestClient::new(&settings.storage.base_url, &key))
        .transpose()?;

    let users = Arc::new(RestUserRepository::new(primary.clone(), fallback));
    let accounts = Arc::new(RestAccountRepository::new(primary.clone()));
    let transactions = Arc::new(RestTransactionRepository::new(primary));

    let pipeline = Arc::new(IngestPipeline::new(
        users.clone(),
        accounts.clone(),
        transactions.clone(),
        bank.clone(),
        classifier.clone(),
    ));

    let state = AppState {
        users,
        accounts,
        transactions,
        bank,
        classifier,
        pipeline,
    };

    run_server(state, &settings.server.host, settings.server.port).await
}
