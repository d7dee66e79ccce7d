//! Combine a scored candidate, its bracket and metadata into a [`Signal`]
//! and hand it to the store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::warn;
use uuid::Uuid;

use super::Signal;
use crate::features::FeatureSet;
use crate::persistence::SignalStore;
use crate::risk::BracketBuilder;
use crate::scoring::Scored;
use crate::universe::UniverseSource;
use crate::utils::error::Result;
use crate::utils::round_to;
use crate::utils::types::TradingStyle;

/// Everything known about a symbol once it has cleared scoring.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub symbol: String,
    pub style: TradingStyle,
    pub scored: Scored,
    pub features: FeatureSet,
    pub entry_price: f64,
    pub universe_source: UniverseSource,
    pub data_provider: String,
    pub notes: Vec<String>,
}

pub struct SignalAssembler {
    builder: BracketBuilder,
    store: Arc<dyn SignalStore>,
}

impl SignalAssembler {
    pub fn new(builder: BracketBuilder, store: Arc<dyn SignalStore>) -> Self {
        Self { builder, store }
    }

    pub fn builder(&self) -> &BracketBuilder {
        &self.builder
    }

    /// Build the immutable record. Fails only on an unusable entry price.
    pub fn assemble(&self, candidate: Candidate, generated_at: DateTime<Utc>) -> Result<Signal> {
        let Candidate { symbol, style, scored, features, entry_price, universe_source, data_provider, mut notes } =
            candidate;
        let bracket = self.builder.build(entry_price, scored.side, style)?;
        notes.push(format!("{style} {} score {:.2}", scored.side, scored.score));
        Ok(Signal {
            id: Uuid::new_v4(),
            symbol,
            side: scored.side,
            style,
            score: round_to(scored.score.clamp(0.0, 10.0), 2),
            features,
            entry_price: bracket.entry,
            stop_price: bracket.stop,
            target_prices: bracket.targets,
            time_stop: bracket.time_stop,
            suggested_size: bracket.size,
            universe_source,
            data_provider,
            generated_at,
            notes,
        })
    }

    /// Assemble and persist. A storage failure is logged, not surfaced:
    /// the caller still gets its pick.
    pub async fn assemble_and_persist(&self, candidate: Candidate) -> Result<Signal> {
        let signal = self.assemble(candidate, Utc::now())?;
        self.persist(&signal).await;
        Ok(signal)
    }

    /// Hand an already-assembled signal to the store, logging failures.
    pub async fn persist(&self, signal: &Signal) -> bool {
        match self.store.save_signal(signal).await {
            | Ok(()) => true,
            | Err(e) => {
                warn!("{}: failed to persist signal {}: {e}", signal.symbol, signal.id);
                false
            }
        }
    }
}
