//! Immutable value objects shared by the forward aggregates

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Maximum number of exit agents an `Entry` rule may list.
pub const MAX_EXIT_AGENTS: usize = 10;
/// Weight assigned to an exit agent when the caller doesn't specify one.
pub const DEFAULT_AGENT_WEIGHT: u8 = 50;

/// Enable/disable state shared by agents and rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForwardStatus {
    Enabled,
    Disabled,
}

impl ForwardStatus {
    pub fn is_enabled(self) -> bool {
        matches!(self, ForwardStatus::Enabled)
    }

    pub fn is_disabled(self) -> bool {
        matches!(self, ForwardStatus::Disabled)
    }

    pub fn can_enable(self) -> bool {
        self.is_disabled()
    }

    pub fn can_disable(self) -> bool {
        self.is_enabled()
    }

    pub fn is_valid(self) -> bool {
        true
    }
}

impl fmt::Display for ForwardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardStatus::Enabled => write!(f, "enabled"),
            ForwardStatus::Disabled => write!(f, "disabled"),
        }
    }
}

/// Transport protocol a rule forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForwardProtocol {
    Tcp,
    Udp,
    Both,
}

impl ForwardProtocol {
    pub fn is_tcp(self) -> bool {
        matches!(self, ForwardProtocol::Tcp | ForwardProtocol::Both)
    }

    pub fn is_udp(self) -> bool {
        matches!(self, ForwardProtocol::Udp | ForwardProtocol::Both)
    }

    pub fn is_both(self) -> bool {
        matches!(self, ForwardProtocol::Both)
    }

    pub fn is_valid(self) -> bool {
        true
    }
}

impl fmt::Display for ForwardProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardProtocol::Tcp => write!(f, "tcp"),
            ForwardProtocol::Udp => write!(f, "udp"),
            ForwardProtocol::Both => write!(f, "both"),
        }
    }
}

/// Which IP family a listener binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IpVersion {
    #[default]
    Auto,
    V4,
    V6,
}

impl IpVersion {
    pub fn is_valid(self) -> bool {
        true
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::Auto => write!(f, "auto"),
            IpVersion::V4 => write!(f, "ipv4"),
            IpVersion::V6 => write!(f, "ipv6"),
        }
    }
}

/// Transport used to tunnel a hop between agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TunnelType {
    #[default]
    Ws,
    Tls,
}

impl TunnelType {
    pub fn is_valid(self) -> bool {
        true
    }
}

impl fmt::Display for TunnelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelType::Ws => write!(f, "ws"),
            TunnelType::Tls => write!(f, "tls"),
        }
    }
}

/// Shape of the forwarding path a rule describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForwardRuleType {
    Direct,
    Entry,
    Chain,
    DirectChain,
    External,
}

impl ForwardRuleType {
    pub fn is_direct(self) -> bool {
        matches!(self, ForwardRuleType::Direct)
    }

    pub fn is_entry(self) -> bool {
        matches!(self, ForwardRuleType::Entry)
    }

    pub fn is_chain(self) -> bool {
        matches!(self, ForwardRuleType::Chain)
    }

    pub fn is_direct_chain(self) -> bool {
        matches!(self, ForwardRuleType::DirectChain)
    }

    pub fn is_external(self) -> bool {
        matches!(self, ForwardRuleType::External)
    }

    /// All rule types except `External` carry an entry-side agent.
    pub fn requires_agent(self) -> bool {
        !self.is_external()
    }

    pub fn requires_chain_agents(self) -> bool {
        self.is_chain() || self.is_direct_chain()
    }

    pub fn requires_chain_port_config(self) -> bool {
        self.is_direct_chain()
    }

    pub fn is_valid(self) -> bool {
        true
    }
}

impl fmt::Display for ForwardRuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardRuleType::Direct => write!(f, "direct"),
            ForwardRuleType::Entry => write!(f, "entry"),
            ForwardRuleType::Chain => write!(f, "chain"),
            ForwardRuleType::DirectChain => write!(f, "direct_chain"),
            ForwardRuleType::External => write!(f, "external"),
        }
    }
}

/// How an `Entry` rule distributes connections across its exit agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoadBalanceStrategy {
    #[default]
    Failover,
    RoundRobin,
    Weighted,
    LeastConnections,
    Random,
}

impl LoadBalanceStrategy {
    pub fn is_weighted(self) -> bool {
        matches!(self, LoadBalanceStrategy::Weighted)
    }

    pub fn is_valid(self) -> bool {
        true
    }
}

impl fmt::Display for LoadBalanceStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadBalanceStrategy::Failover => write!(f, "failover"),
            LoadBalanceStrategy::RoundRobin => write!(f, "round_robin"),
            LoadBalanceStrategy::Weighted => write!(f, "weighted"),
            LoadBalanceStrategy::LeastConnections => write!(f, "least_connections"),
            LoadBalanceStrategy::Random => write!(f, "random"),
        }
    }
}

/// Inclusive port bounds, e.g. the ports an agent is allowed to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

impl PortRange {
    pub fn new(min: u16, max: u16) -> Result<Self, DomainError> {
        let range = PortRange { min, max };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.min == 0 {
            return Err(DomainError::ValidationError(
                "port range minimum must be at least 1".to_string(),
            ));
        }
        if self.min > self.max {
            return Err(DomainError::ValidationError(format!(
                "port range minimum {} exceeds maximum {}",
                self.min, self.max
            )));
        }
        Ok(())
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.min && port <= self.max
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// One weighted exit agent in an `Entry` rule's load-balancing set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentWeight {
    pub agent_id: u64,
    pub weight: u8,
    pub is_backup: bool,
}

impl AgentWeight {
    pub fn new(agent_id: u64, weight: u8, is_backup: bool) -> Result<Self, DomainError> {
        if agent_id == 0 {
            return Err(DomainError::ValidationError(
                "exit agent id must be non-zero".to_string(),
            ));
        }
        if !(1..=100).contains(&weight) {
            return Err(DomainError::ValidationError(format!(
                "exit agent weight {} out of range 1-100",
                weight
            )));
        }
        Ok(AgentWeight {
            agent_id,
            weight,
            is_backup,
        })
    }

    pub fn is_valid(&self) -> bool {
        self.agent_id != 0 && (1..=100).contains(&self.weight)
    }
}

impl fmt::Display for AgentWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "agent {} (weight {}{})",
            self.agent_id,
            self.weight,
            if self.is_backup { ", backup" } else { "" }
        )
    }
}

/// Validates a full set of exit agents: count bound, uniqueness, and (for the
/// `Weighted` strategy) at least one non-backup entry.
pub fn validate_agent_weights(
    weights: &[AgentWeight],
    strategy: LoadBalanceStrategy,
) -> Result<(), DomainError> {
    if weights.len() > MAX_EXIT_AGENTS {
        return Err(DomainError::ValidationError(format!(
            "at most {} exit agents allowed, got {}",
            MAX_EXIT_AGENTS,
            weights.len()
        )));
    }

    let mut seen = HashSet::with_capacity(weights.len());
    for w in weights {
        if !w.is_valid() {
            return Err(DomainError::ValidationError(format!(
                "invalid exit agent weight: {}",
                w
            )));
        }
        if !seen.insert(w.agent_id) {
            return Err(DomainError::ValidationError(format!(
                "duplicate exit agent id: {}",
                w.agent_id
            )));
        }
    }

    if strategy.is_weighted() && !weights.is_empty() && weights.iter().all(|w| w.is_backup) {
        return Err(DomainError::ValidationError(
            "weighted strategy requires at least one non-backup exit agent".to_string(),
        ));
    }

    Ok(())
}

/// Project the agent ids out of a set of weighted exit agents.
pub fn agent_ids(weights: &[AgentWeight]) -> Vec<u64> {
    weights.iter().map(|w| w.agent_id).collect()
}

/// Administrative ownership scope of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleScope {
    System,
    User(u64),
}

impl fmt::Display for RuleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleScope::System => write!(f, "system"),
            RuleScope::User(id) => write!(f, "user:{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_idempotence_predicates() {
        assert!(ForwardStatus::Disabled.can_enable());
        assert!(!ForwardStatus::Enabled.can_enable());
        assert!(ForwardStatus::Enabled.can_disable());
        assert!(!ForwardStatus::Disabled.can_disable());
    }

    #[test]
    fn protocol_both_satisfies_tcp_and_udp() {
        assert!(ForwardProtocol::Both.is_tcp());
        assert!(ForwardProtocol::Both.is_udp());
        assert!(ForwardProtocol::Both.is_both());
        assert!(!ForwardProtocol::Tcp.is_udp());
    }

    #[test]
    fn rule_type_requires_agent_except_external() {
        assert!(ForwardRuleType::Direct.requires_agent());
        assert!(!ForwardRuleType::External.requires_agent());
        assert!(ForwardRuleType::Chain.requires_chain_agents());
        assert!(!ForwardRuleType::Direct.requires_chain_agents());
        assert!(ForwardRuleType::DirectChain.requires_chain_port_config());
        assert!(!ForwardRuleType::Chain.requires_chain_port_config());
    }

    #[test]
    fn port_range_validates_bounds() {
        assert!(PortRange::new(100, 200).is_ok());
        assert!(PortRange::new(0, 200).is_err());
        assert!(PortRange::new(300, 200).is_err());
    }

    #[test]
    fn port_range_contains() {
        let range = PortRange::new(100, 200).unwrap();
        assert!(range.contains(150));
        assert!(!range.contains(50));
    }

    #[test]
    fn agent_weight_rejects_zero_id_and_bad_weight() {
        assert!(AgentWeight::new(0, 50, false).is_err());
        assert!(AgentWeight::new(1, 0, false).is_err());
        assert!(AgentWeight::new(1, 101, false).is_err());
        assert!(AgentWeight::new(1, 50, false).is_ok());
    }

    #[test]
    fn validate_agent_weights_rejects_duplicates() {
        let weights = vec![
            AgentWeight::new(1, 50, false).unwrap(),
            AgentWeight::new(1, 50, false).unwrap(),
        ];
        assert!(validate_agent_weights(&weights, LoadBalanceStrategy::Failover).is_err());
    }

    #[test]
    fn validate_agent_weights_weighted_requires_non_backup() {
        let all_backup = vec![
            AgentWeight::new(1, 50, true).unwrap(),
            AgentWeight::new(2, 50, true).unwrap(),
        ];
        assert!(validate_agent_weights(&all_backup, LoadBalanceStrategy::Weighted).is_err());

        let mixed = vec![
            AgentWeight::new(1, 50, true).unwrap(),
            AgentWeight::new(2, 50, false).unwrap(),
        ];
        assert!(validate_agent_weights(&mixed, LoadBalanceStrategy::Weighted).is_ok());
    }

    #[test]
    fn validate_agent_weights_enforces_max_count() {
        let weights: Vec<_> = (1..=(MAX_EXIT_AGENTS as u64 + 1))
            .map(|id| AgentWeight::new(id, 50, false).unwrap())
            .collect();
        assert!(validate_agent_weights(&weights, LoadBalanceStrategy::Failover).is_err());
    }

    #[test]
    fn agent_ids_projects_ids_in_order() {
        let weights = vec![
            AgentWeight::new(3, 50, false).unwrap(),
            AgentWeight::new(1, 50, false).unwrap(),
        ];
        assert_eq!(agent_ids(&weights), vec![3, 1]);
    }
}
