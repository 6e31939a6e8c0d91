//! Watch-set management and rotation.
//!
//! Owns the bounded set of markets under live subscription plus the ranked
//! candidate pool left over from discovery. Removal events (a filled trade,
//! or a market judged persistently expensive) arrive through one queue
//! consumer, so membership changes are never concurrent: the retiring
//! market's tokens are unsubscribed first, then the pool cursor advances to
//! the next eligible candidate, whose book is pre-fetched to confirm
//! two-sided depth before it is subscribed.

use polyarb_polymarket::{Market, MarketStream, ScoredMarket, VenueClient};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Why a market is leaving the watch set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// An arbitrage trade consumed it.
    Traded,
    /// Persistently expensive; rotated out proactively.
    Unfavorable,
}

/// A removal request for the rotation queue.
#[derive(Debug, Clone)]
pub struct RemovalRequest {
    pub market_id: String,
    pub reason: RemovalReason,
}

/// Creates the rotation queue shared by strategy tasks and the manager.
#[must_use]
pub fn removal_queue(capacity: usize) -> (mpsc::Sender<RemovalRequest>, mpsc::Receiver<RemovalRequest>) {
    mpsc::channel(capacity)
}

/// Bounded watch set plus candidate pool.
pub struct WatchSetManager {
    stream: MarketStream,
    client: Arc<VenueClient>,
    max_watched: usize,
    watched: Vec<Market>,
    pool: Vec<ScoredMarket>,
    cursor: usize,
    /// Market ids and token ids that may never (re-)enter the watch set.
    replaced: HashSet<String>,
}

impl WatchSetManager {
    /// Creates an empty manager over the stream and REST client.
    #[must_use]
    pub fn new(stream: MarketStream, client: Arc<VenueClient>, max_watched: usize) -> Self {
        Self {
            stream,
            client,
            max_watched,
            watched: Vec::new(),
            pool: Vec::new(),
            cursor: 0,
            replaced: HashSet::new(),
        }
    }

    /// Installs the initial watch set from a ranked discovery result.
    ///
    /// Takes the top K as live subscriptions; the remainder becomes the
    /// candidate pool.
    pub async fn install(&mut self, ranked: Vec<ScoredMarket>) {
        let mut tokens = Vec::new();
        for scored in ranked.iter().take(self.max_watched) {
            tokens.push(scored.market.token_a.clone());
            tokens.push(scored.market.token_b.clone());
            self.watched.push(scored.market.clone());
        }
        self.pool = ranked.into_iter().skip(self.max_watched).collect();
        self.cursor = 0;

        self.stream.subscribe(&tokens).await;
        info!(
            watched = self.watched.len(),
            pool = self.pool.len(),
            "Watch set installed"
        );
    }

    /// The currently watched markets.
    #[must_use]
    pub fn watched(&self) -> &[Market] {
        &self.watched
    }

    /// Looks up a watched market by id.
    #[must_use]
    pub fn get(&self, market_id: &str) -> Option<&Market> {
        self.watched.iter().find(|m| m.market_id == market_id)
    }

    /// Remaining candidates ahead of the cursor.
    #[must_use]
    pub fn pool_remaining(&self) -> usize {
        self.pool.len().saturating_sub(self.cursor)
    }

    /// Replaces the candidate pool from a fresh discovery scan.
    ///
    /// Candidates already watched, already used, or already retired are
    /// filtered out; the cursor restarts at the best remaining candidate.
    pub fn refresh_pool(&mut self, ranked: Vec<ScoredMarket>) {
        let live_tokens = self.live_token_set();
        self.pool = ranked
            .into_iter()
            .filter(|s| {
                !self.replaced.contains(&s.market.market_id)
                    && !live_tokens.contains(&s.market.token_a)
                    && !live_tokens.contains(&s.market.token_b)
                    && self.get(&s.market.market_id).is_none()
            })
            .collect();
        self.cursor = 0;
        debug!(pool = self.pool.len(), "Candidate pool refreshed");
    }

    /// Handles one removal event: retire, then promote a replacement.
    pub async fn handle_removal(&mut self, request: &RemovalRequest) {
        let Some(index) = self
            .watched
            .iter()
            .position(|m| m.market_id == request.market_id)
        else {
            debug!(market_id = %request.market_id, "Removal for unknown market");
            return;
        };

        let retired = self.watched.remove(index);
        info!(
            market = %retired.question,
            reason = ?request.reason,
            "Retiring market from watch set"
        );

        // Retired tokens must be fully unsubscribed before any replacement
        // subscribes, so no token ever belongs to two watched markets.
        self.stream
            .unsubscribe(&[retired.token_a.clone(), retired.token_b.clone()])
            .await;
        self.replaced.insert(retired.market_id.clone());
        self.replaced.insert(retired.token_a);
        self.replaced.insert(retired.token_b);

        match self.next_candidate().await {
            Some(candidate) => {
                let tokens = vec![
                    candidate.market.token_a.clone(),
                    candidate.market.token_b.clone(),
                ];
                self.stream.subscribe(&tokens).await;
                info!(
                    market = %candidate.market.question,
                    score = %candidate.score,
                    "Promoted replacement market"
                );
                self.replaced.insert(candidate.market.market_id.clone());
                self.replaced.insert(candidate.market.token_a.clone());
                self.replaced.insert(candidate.market.token_b.clone());
                self.watched.push(candidate.market);
            }
            None => {
                warn!(
                    watched = self.watched.len(),
                    "No eligible replacement; watch set shrinks"
                );
            }
        }
    }

    /// Advances the cursor to the next eligible candidate with verified
    /// two-sided depth. Consumed candidates are never revisited.
    async fn next_candidate(&mut self) -> Option<ScoredMarket> {
        let live_tokens = self.live_token_set();

        while self.cursor < self.pool.len() {
            let candidate = self.pool[self.cursor].clone();
            self.cursor += 1;

            if self.replaced.contains(&candidate.market.market_id)
                || self.replaced.contains(&candidate.market.token_a)
                || self.replaced.contains(&candidate.market.token_b)
                || live_tokens.contains(&candidate.market.token_a)
                || live_tokens.contains(&candidate.market.token_b)
            {
                debug!(market = %candidate.market.question, "Skipping overlapping candidate");
                continue;
            }

            if !self.has_two_sided_depth(&candidate).await {
                debug!(market = %candidate.market.question, "Candidate lacks two-sided depth");
                continue;
            }

            return Some(candidate);
        }

        None
    }

    async fn has_two_sided_depth(&self, candidate: &ScoredMarket) -> bool {
        for token in candidate.market.token_ids() {
            match self.client.book_snapshot(token).await {
                Ok(book) if book.is_two_sided() => {}
                Ok(_) => return false,
                Err(e) => {
                    warn!(token, error = %e, "Snapshot prefetch failed");
                    return false;
                }
            }
        }
        true
    }

    fn live_token_set(&self) -> HashSet<String> {
        self.watched
            .iter()
            .flat_map(|m| [m.token_a.clone(), m.token_b.clone()])
            .collect()
    }
}
