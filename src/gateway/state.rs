use std::sync::Arc;

use crate::clock::Clock;
use crate::meal::MealOrchestrator;
use crate::settlement::SettlementAggregator;
use crate::store::Storage;
use crate::token::{CodecError, TimedTokenCache, TokenCodec, TokenRegistry, bounded_ttl};
use crate::wallet::WalletLedger;

/// Shared gateway state. Every component is constructed once at startup and
/// handed the same store and clock.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Storage>,
    pub clock: Arc<dyn Clock>,
    pub tokens: Arc<TokenRegistry>,
    pub ledger: Arc<WalletLedger>,
    pub meals: Arc<MealOrchestrator>,
    pub settlements: Arc<SettlementAggregator>,
}

impl AppState {
    /// Wire the components over one backend.
    pub fn new(
        store: Arc<dyn Storage>,
        clock: Arc<dyn Clock>,
        token_secret: &str,
        token_ttl_seconds: u64,
        currency: &str,
    ) -> Result<Self, CodecError> {
        let codec = TokenCodec::new(token_secret)?;
        let token_ttl_seconds = bounded_ttl(token_ttl_seconds);
        let cache = Arc::new(TimedTokenCache::new(token_ttl_seconds));
        let tokens = Arc::new(TokenRegistry::new(
            store.clone(),
            cache,
            codec,
            clock.clone(),
            token_ttl_seconds,
        ));
        let ledger = Arc::new(WalletLedger::new(store.clone(), clock.clone(), currency));
        let meals = Arc::new(MealOrchestrator::new(
            store.clone(),
            tokens.clone(),
            ledger.clone(),
            clock.clone(),
        ));
        let settlements = Arc::new(SettlementAggregator::new(store.clone(), clock.clone()));

        Ok(Self {
            store,
            clock,
            tokens,
            ledger,
            meals,
            settlements,
        })
    }
}
