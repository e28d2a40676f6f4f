//! Keyed lookup of agent descriptors.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::agents::{AgentDescriptor, AgentType};

#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentRegistry {
    agents: BTreeMap<AgentType, AgentDescriptor>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor, replacing any previous one of the same type.
    pub fn register(&mut self, descriptor: AgentDescriptor) -> Option<AgentDescriptor> {
        self.agents.insert(descriptor.agent_type, descriptor)
    }

    pub fn get(&self, agent_type: AgentType) -> Option<&AgentDescriptor> {
        self.agents.get(&agent_type)
    }

    /// Agents advertising `capability`, in agent-type order.
    pub fn find_by_capability(&self, capability: &str) -> Vec<&AgentDescriptor> {
        self.agents
            .values()
            .filter(|descriptor| descriptor.capabilities.iter().any(|c| c == capability))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
