//! The six loop agents and their shared lifecycle contract.
//!
//! Agents are deterministic: given the same inputs (and the same command
//! runner responses) they produce the same outputs. Each owns its id counters.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::io::runner::CommandRunner;
use crate::io::storage::Storage;

pub mod detector;
pub mod evolver;
pub mod fixer;
pub mod hypothesis;
mod render;
pub mod tester;
pub mod verifier;

/// Shared, optional command runner held by agents that execute commands.
pub type SharedRunner = Option<Arc<dyn CommandRunner>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    ProblemDetector,
    HypothesisGenerator,
    HypothesisTester,
    FixGenerator,
    FixVerifier,
    BenchmarkEvolver,
}

impl AgentType {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentType::ProblemDetector => "problem_detector",
            AgentType::HypothesisGenerator => "hypothesis_generator",
            AgentType::HypothesisTester => "hypothesis_tester",
            AgentType::FixGenerator => "fix_generator",
            AgentType::FixVerifier => "fix_verifier",
            AgentType::BenchmarkEvolver => "benchmark_evolver",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared output fidelity. Metadata only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Mvp,
    Enhanced,
    Full,
}

/// Self-description used for discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub agent_type: AgentType,
    pub name: String,
    pub capabilities: Vec<String>,
    pub version: String,
    pub quality_tier: QualityTier,
}

impl AgentDescriptor {
    pub(crate) fn new(
        agent_type: AgentType,
        name: &str,
        capabilities: &[&str],
        quality_tier: QualityTier,
    ) -> Self {
        Self {
            agent_type,
            name: name.to_string(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            quality_tier,
        }
    }
}

/// Storage handle tracked by every agent between `initialize` and `shutdown`.
#[derive(Default)]
pub struct Lifecycle {
    storage: Option<Arc<dyn Storage>>,
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("ready", &self.storage.is_some())
            .finish()
    }
}

/// Lifecycle contract shared by all agents.
///
/// Readiness is informational: agents operate whether or not storage was
/// provided. Storage failures are logged, never surfaced.
pub trait Agent {
    fn descriptor(&self) -> AgentDescriptor;

    fn lifecycle(&self) -> &Lifecycle;

    fn lifecycle_mut(&mut self) -> &mut Lifecycle;

    fn initialize(&mut self, storage: Arc<dyn Storage>) {
        let descriptor = self.descriptor();
        let key = format!("agents/{}", descriptor.agent_type);
        match serde_json::to_value(&descriptor) {
            Ok(value) => {
                if let Err(err) = storage.put(&key, value) {
                    warn!(agent = %descriptor.agent_type, err = %err, "failed to record agent descriptor");
                }
            }
            Err(err) => {
                warn!(agent = %descriptor.agent_type, err = %err, "failed to serialize agent descriptor");
            }
        }
        debug!(agent = %descriptor.agent_type, "agent initialized");
        self.lifecycle_mut().storage = Some(storage);
    }

    fn is_ready(&self) -> bool {
        self.lifecycle().storage.is_some()
    }

    fn shutdown(&mut self) {
        debug!(agent = %self.descriptor().agent_type, "agent shut down");
        self.lifecycle_mut().storage = None;
    }
}
