//! Domain core for the port-forwarding control plane
//!
//! Owns the [`ForwardAgent`] and [`ForwardRule`] aggregates, their value
//! objects, the single validator that enforces cross-field invariants, and
//! the repository contracts a persistence adapter must satisfy. Nothing in
//! this module opens a socket, speaks HTTP, or touches a database driver.

mod address;
mod agent;
mod clock;
mod errors;
mod rule;
mod sid;
mod token;
mod validator;
mod value_objects;

#[cfg(feature = "repository")]
mod repository;

pub mod testing;

pub use agent::ForwardAgent;
pub use clock::{Clock, UtcClock};
pub use errors::{DomainError, ForwardAuthError};
pub use rule::{ForwardRule, ForwardRuleOptions, ForwardRuleRecord, HopMode, Target};
pub use sid::{RandomSidGenerator, SidGenerator};
pub use token::{Sha256TokenGenerator, TokenGenerator};
pub use value_objects::{
    agent_ids, validate_agent_weights, AgentWeight, ForwardProtocol, ForwardRuleType,
    ForwardStatus, IpVersion, LoadBalanceStrategy, PortRange, RuleScope, TunnelType,
    DEFAULT_AGENT_WEIGHT, MAX_EXIT_AGENTS,
};

#[cfg(feature = "repository")]
pub use repository::{
    ForwardAgentFilter, ForwardAgentRepository, ForwardRuleFilter, ForwardRuleRepository,
};
