use std::sync::Arc;

use bank_client::BankSource;
use classifier::DeductionClassifier;
use ingest::IngestPipeline;
use storage::{AccountRepository, TransactionRepository, UserRepository};

/// Shared application state: every external collaborator behind a seam,
/// injected once at startup instead of living as module singletons.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub bank: Arc<dyn BankSource>,
    pub classifier: Arc<DeductionClassifier>,
    pub pipeline: Arc<IngestPipeline>,
}
