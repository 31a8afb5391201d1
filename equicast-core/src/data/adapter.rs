//! Exchange-suffix fallback over a single provider.
//!
//! A bare ticker is tried under each suffix in order (`.NS`, then `.BO` by
//! default). The first suffix that yields a non-empty, schema-valid frame
//! wins. A fixed politeness sleep follows every provider request, successful
//! or not; there is no adaptive backoff.

use super::normalize::normalize_frame;
use super::provider::{DataError, DataProvider, FetchWindow};
use crate::domain::{BarSeries, DataKind};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_SUFFIXES: [&str; 2] = [".NS", ".BO"];

pub struct ExchangeAdapter {
    provider: Arc<dyn DataProvider>,
    suffixes: Vec<String>,
    delay: Duration,
}

impl ExchangeAdapter {
    pub fn new(provider: Arc<dyn DataProvider>, suffixes: Vec<String>, delay: Duration) -> Self {
        Self {
            provider,
            suffixes,
            delay,
        }
    }

    /// Adapter with the default `.NS` / `.BO` suffixes.
    pub fn with_default_suffixes(provider: Arc<dyn DataProvider>, delay: Duration) -> Self {
        Self::new(
            provider,
            DEFAULT_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            delay,
        )
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    /// Fetch bars for a bare ticker, trying each suffix in order.
    pub fn fetch(
        &self,
        ticker: &str,
        kind: DataKind,
        window: &FetchWindow,
    ) -> Result<BarSeries, DataError> {
        let mut tried = Vec::with_capacity(self.suffixes.len());

        for suffix in &self.suffixes {
            let symbol = format!("{ticker}{suffix}");
            debug!(ticker, symbol = %symbol, provider = self.provider.name(), "requesting bars");

            let outcome = self
                .provider
                .fetch(&symbol, window)
                .and_then(|frame| normalize_frame(&symbol, frame));
            self.pause();

            match outcome {
                Ok(bars) => {
                    debug!(ticker, symbol = %symbol, bars = bars.len(), "resolved");
                    return Ok(BarSeries {
                        ticker: ticker.to_string(),
                        symbol,
                        kind,
                        source: self.provider.source(),
                        bars,
                    });
                }
                Err(e) => {
                    warn!(ticker, symbol = %symbol, reason = %e, "suffix failed, trying next");
                    tried.push(symbol);
                }
            }
        }

        Err(DataError::NotFound {
            ticker: ticker.to_string(),
            tried,
        })
    }

    fn pause(&self) {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
    }
}
