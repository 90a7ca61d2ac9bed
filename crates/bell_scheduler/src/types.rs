use crate::alarm::Ticker;
use crate::bell::PlayerHandle;
use crate::service::BellService;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// State shared by every HTTP handler.
pub struct AppState {
    pub service: Arc<BellService>,
    pub player: PlayerHandle,
    pub ticker: Mutex<Ticker>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(service: Arc<BellService>, player: PlayerHandle, ticker: Ticker) -> Self {
        Self {
            service,
            player,
            ticker: Mutex::new(ticker),
            started_at: Instant::now(),
        }
    }
}
