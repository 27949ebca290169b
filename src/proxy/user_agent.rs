//! User-Agent selection for outbound requests.
//!
//! The pool is built once from configuration and never mutated. Selection
//! is either random per request, or seeded, in which case the agent is a
//! pure function of the seed and the target URL, so tests and
//! reproductions see the same header every time.

use axum::http::HeaderValue;
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::model::{UpstreamSettings, DEFAULT_USER_AGENTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Random,
    Seeded(u64),
}

#[derive(Debug, Clone)]
pub struct UserAgentPool {
    agents: Vec<HeaderValue>,
    selector: Selector,
}

impl UserAgentPool {
    /// Build a pool, skipping values that are not valid header values. An
    /// empty result falls back to the built-in agents.
    #[must_use]
    pub fn new<S: AsRef<str>>(agents: &[S], selector: Selector) -> Self {
        let mut parsed: Vec<HeaderValue> = agents
            .iter()
            .filter_map(|agent| HeaderValue::from_str(agent.as_ref()).ok())
            .collect();
        if parsed.is_empty() {
            tracing::warn!("no usable user agents configured, using built-in pool");
            parsed = DEFAULT_USER_AGENTS
                .iter()
                .copied()
                .map(HeaderValue::from_static)
                .collect();
        }
        Self {
            agents: parsed,
            selector,
        }
    }

    #[must_use]
    pub fn from_settings(settings: &UpstreamSettings) -> Self {
        let selector = settings
            .user_agent_seed
            .map_or(Selector::Random, Selector::Seeded);
        Self::new(settings.user_agents.as_slice(), selector)
    }

    #[must_use]
    pub const fn selector(&self) -> Selector {
        self.selector
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Agent to send for a request to `target`.
    #[must_use]
    pub fn pick(&self, target: &Url) -> &HeaderValue {
        let index = match self.selector {
            Selector::Random => fastrand::usize(..self.agents.len()),
            Selector::Seeded(seed) => seeded_index(seed, target, self.agents.len()),
        };
        &self.agents[index]
    }
}

#[allow(clippy::cast_possible_truncation)]
fn seeded_index(seed: u64, target: &Url, len: usize) -> usize {
    let digest = Sha256::new()
        .chain_update(seed.to_le_bytes())
        .chain_update(target.as_str().as_bytes())
        .finalize();
    let mut word = [0_u8; 8];
    word.copy_from_slice(&digest[..8]);
    (u64::from_le_bytes(word) % len as u64) as usize
}
