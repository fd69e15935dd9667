//! The single cross-field validator for [`ForwardRule`]
//!
//! Both constructors and every mutator that can break a cross-field
//! invariant route through [`validate`]. Checks run in a fixed order and
//! return on the first violation.

use std::collections::HashSet;
use std::net::IpAddr;

use super::address;
use super::errors::DomainError;
use super::rule::ForwardRule;
use super::value_objects::{self, ForwardRuleType};

const MAX_CHAIN_AGENTS: usize = 10;
const MAX_TRAFFIC_MULTIPLIER: f64 = 1_000_000.0;

pub(crate) fn validate(rule: &ForwardRule) -> Result<(), DomainError> {
    validate_identity(rule)?;
    validate_multiplier(rule)?;
    validate_bind_ip(rule)?;

    match rule.rule_type() {
        ForwardRuleType::Direct => validate_direct(rule),
        ForwardRuleType::Entry => validate_entry(rule),
        ForwardRuleType::Chain => validate_chain(rule),
        ForwardRuleType::DirectChain => validate_direct_chain(rule),
        ForwardRuleType::External => validate_external(rule),
    }
}

fn validate_identity(rule: &ForwardRule) -> Result<(), DomainError> {
    if rule.rule_type().requires_agent() && rule.agent_id() == 0 {
        return Err(DomainError::ValidationError(
            "agent id is required for this rule type".to_string(),
        ));
    }
    if rule.listen_port() == 0 {
        return Err(DomainError::ValidationError(
            "listen port must be non-zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_multiplier(rule: &ForwardRule) -> Result<(), DomainError> {
    if let Some(m) = rule.traffic_multiplier() {
        if !(0.0..=MAX_TRAFFIC_MULTIPLIER).contains(&m) {
            return Err(DomainError::ValidationError(format!(
                "traffic multiplier {} out of range [0, {}]",
                m, MAX_TRAFFIC_MULTIPLIER
            )));
        }
    }
    Ok(())
}

fn validate_bind_ip(rule: &ForwardRule) -> Result<(), DomainError> {
    if !rule.bind_ip().is_empty() && rule.bind_ip().parse::<IpAddr>().is_err() {
        return Err(DomainError::ValidationError(format!(
            "invalid bind ip: {}",
            rule.bind_ip()
        )));
    }
    Ok(())
}

/// Exactly one of a static `{address, port}` or `target_node_id` must be set.
fn validate_target(rule: &ForwardRule) -> Result<(), DomainError> {
    let has_static = !rule.target_address().is_empty() && rule.target_port() != 0;
    let has_node = rule.has_target_node();

    match (has_static, has_node) {
        (true, true) => Err(DomainError::ValidationError(
            "target must be either a static address or a node id, not both".to_string(),
        )),
        (false, false) => Err(DomainError::ValidationError(
            "target address/port or target node id is required".to_string(),
        )),
        (true, false) => {
            if !address::is_valid_host(rule.target_address()) {
                return Err(DomainError::ValidationError(format!(
                    "invalid target address: {}",
                    rule.target_address()
                )));
            }
            Ok(())
        }
        (false, true) => Ok(()),
    }
}

fn validate_chain_agent_ids(rule: &ForwardRule) -> Result<(), DomainError> {
    let chain = rule.chain_agent_ids();
    if chain.is_empty() || chain.len() > MAX_CHAIN_AGENTS {
        return Err(DomainError::ValidationError(format!(
            "chain must contain between 1 and {} agents, got {}",
            MAX_CHAIN_AGENTS,
            chain.len()
        )));
    }

    let mut seen = HashSet::with_capacity(chain.len());
    for &agent in chain {
        if agent == 0 {
            return Err(DomainError::ValidationError(
                "chain agent id must be non-zero".to_string(),
            ));
        }
        if agent == rule.agent_id() {
            return Err(DomainError::ValidationError(format!(
                "chain contains the entry agent: {}",
                agent
            )));
        }
        if !seen.insert(agent) {
            return Err(DomainError::ValidationError(format!(
                "chain contains duplicate agent ID: {}",
                agent
            )));
        }
    }
    Ok(())
}

fn validate_tunnel_hops(rule: &ForwardRule) -> Result<(), DomainError> {
    if let Some(hops) = rule.tunnel_hops() {
        if hops as usize > rule.chain_agent_ids().len() {
            return Err(DomainError::ValidationError(format!(
                "tunnel_hops {} exceeds chain length {}",
                hops,
                rule.chain_agent_ids().len()
            )));
        }
    }
    Ok(())
}

fn validate_direct(rule: &ForwardRule) -> Result<(), DomainError> {
    validate_target(rule)
}

fn validate_entry(rule: &ForwardRule) -> Result<(), DomainError> {
    let has_single = rule.exit_agent_id() != 0;
    let has_weighted = !rule.exit_agents().is_empty();

    match (has_single, has_weighted) {
        (true, true) => {
            return Err(DomainError::ValidationError(
                "exit_agent_id and exit_agents are mutually exclusive".to_string(),
            ))
        }
        (false, false) => {
            return Err(DomainError::ValidationError(
                "entry rule requires exit_agent_id or exit_agents".to_string(),
            ))
        }
        _ => {}
    }

    if has_single && rule.exit_agent_id() == rule.agent_id() {
        return Err(DomainError::ValidationError(
            "exit agent cannot be the same as entry agent".to_string(),
        ));
    }

    if has_weighted {
        value_objects::validate_agent_weights(rule.exit_agents(), rule.load_balance_strategy())?;
        if rule.exit_agents().iter().any(|w| w.agent_id == rule.agent_id()) {
            return Err(DomainError::ValidationError(
                "exit agent cannot be the same as entry agent".to_string(),
            ));
        }
    }

    validate_target(rule)
}

fn validate_chain(rule: &ForwardRule) -> Result<(), DomainError> {
    validate_chain_agent_ids(rule)?;
    validate_tunnel_hops(rule)?;

    let chain = rule.chain_agent_ids();
    let hybrid_hops = match rule.tunnel_hops() {
        Some(hops) if hops > 0 && (hops as usize) < chain.len() => Some(hops as usize),
        _ => None,
    };

    match hybrid_hops {
        Some(hops) => {
            let expected: HashSet<u64> = chain[hops..].iter().copied().collect();
            validate_port_config_matches(rule, &expected)?;
        }
        None => {
            if !rule.chain_port_config().is_empty() {
                return Err(DomainError::ValidationError(
                    "chain_port_config must be empty unless the chain is hybrid".to_string(),
                ));
            }
        }
    }

    validate_target(rule)
}

fn validate_direct_chain(rule: &ForwardRule) -> Result<(), DomainError> {
    validate_chain_agent_ids(rule)?;
    let expected: HashSet<u64> = rule.chain_agent_ids().iter().copied().collect();
    validate_port_config_matches(rule, &expected)?;
    validate_target(rule)
}

fn validate_port_config_matches(rule: &ForwardRule, expected: &HashSet<u64>) -> Result<(), DomainError> {
    let config = rule.chain_port_config();
    let keys: HashSet<u64> = config.keys().copied().collect();
    if &keys != expected {
        return Err(DomainError::ValidationError(
            "chain_port_config keys must match the agents requiring a direct hop exactly".to_string(),
        ));
    }
    if config.values().any(|&port| port == 0) {
        return Err(DomainError::ValidationError(
            "chain_port_config ports must be non-zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_external(rule: &ForwardRule) -> Result<(), DomainError> {
    if !rule.has_target_node() {
        return Err(DomainError::ValidationError(
            "external rule requires a target_node_id".to_string(),
        ));
    }
    if rule.server_address().is_empty() {
        return Err(DomainError::ValidationError(
            "external rule requires a server_address".to_string(),
        ));
    }
    if !address::is_valid_host(rule.server_address()) {
        return Err(DomainError::ValidationError(format!(
            "invalid server address: {}",
            rule.server_address()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::clock::UtcClock;
    use crate::forward::rule::{ForwardRuleOptions, Target};
    use crate::forward::sid::RandomSidGenerator;
    use crate::forward::value_objects::ForwardProtocol;
    use std::collections::HashMap;

    fn new_rule(
        rule_type: ForwardRuleType,
        options: ForwardRuleOptions,
    ) -> Result<ForwardRule, DomainError> {
        ForwardRule::new(
            rule_type,
            1,
            8080,
            ForwardProtocol::Tcp,
            Target::Static {
                address: "10.0.0.1".to_string(),
                port: 80,
            },
            options,
            &RandomSidGenerator,
            &UtcClock,
        )
    }

    #[test]
    fn node_target_without_static_is_valid() {
        let result = ForwardRule::new(
            ForwardRuleType::Direct,
            1,
            8080,
            ForwardProtocol::Tcp,
            Target::Node(5),
            ForwardRuleOptions::default(),
            &RandomSidGenerator,
            &UtcClock,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_zero_listen_port() {
        let result = ForwardRule::new(
            ForwardRuleType::Direct,
            1,
            0,
            ForwardProtocol::Tcp,
            Target::Node(5),
            ForwardRuleOptions::default(),
            &RandomSidGenerator,
            &UtcClock,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_multiplier_out_of_range() {
        let result = new_rule(
            ForwardRuleType::Direct,
            ForwardRuleOptions {
                traffic_multiplier: Some(-0.1),
                ..Default::default()
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn chain_requires_nonempty_port_config_when_hybrid() {
        let result = new_rule(
            ForwardRuleType::Chain,
            ForwardRuleOptions {
                chain_agent_ids: vec![2, 3, 4],
                tunnel_hops: Some(2),
                ..Default::default()
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn direct_chain_requires_exact_port_config() {
        let mut config = HashMap::new();
        config.insert(2, 7001);

        let result = new_rule(
            ForwardRuleType::DirectChain,
            ForwardRuleOptions {
                chain_agent_ids: vec![2, 3],
                chain_port_config: config,
                ..Default::default()
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn external_requires_node_and_server_address() {
        let result = ForwardRule::new_external(
            8080,
            ForwardProtocol::Tcp,
            0,
            "",
            ForwardRuleOptions::default(),
            &RandomSidGenerator,
            &UtcClock,
        );
        assert!(result.is_err());

        let result = ForwardRule::new_external(
            8080,
            ForwardProtocol::Tcp,
            7,
            "relay.example.com",
            ForwardRuleOptions::default(),
            &RandomSidGenerator,
            &UtcClock,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_invalid_bind_ip() {
        let result = new_rule(
            ForwardRuleType::Direct,
            ForwardRuleOptions {
                bind_ip: "not-an-ip".to_string(),
                ..Default::default()
            },
        );
        assert!(result.is_err());
    }
}
