//! `ForwardRule` aggregate: one forwarding configuration

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::clock::Clock;
use super::errors::DomainError;
use super::sid::SidGenerator;
use super::validator;
use super::value_objects::{
    AgentWeight, ForwardProtocol, ForwardRuleType, ForwardStatus, IpVersion, LoadBalanceStrategy,
    TunnelType,
};

/// Where a chain hop sends its traffic: over the tunnel transport, as a
/// direct TCP/UDP leg, or at the boundary between the two (hybrid chains).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopMode {
    Tunnel,
    Direct,
    Boundary,
}

/// The forwarding target: either a static address/port pair or a reference
/// to another node's id. Exactly one applies to any non-external rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Static { address: String, port: u16 },
    Node(u64),
}

/// Optional fields shared by [`ForwardRule::new`] and [`ForwardRule::new_external`].
/// Everything here has a sensible empty/default value.
#[derive(Debug, Clone, Default)]
pub struct ForwardRuleOptions {
    pub user_id: Option<u64>,
    pub subscription_id: Option<u64>,
    pub bind_ip: String,
    pub ip_version: IpVersion,
    pub exit_agent_id: u64,
    pub exit_agents: Vec<AgentWeight>,
    pub load_balance_strategy: LoadBalanceStrategy,
    pub chain_agent_ids: Vec<u64>,
    pub chain_port_config: HashMap<u64, u16>,
    pub tunnel_hops: Option<u32>,
    pub tunnel_type: TunnelType,
    pub traffic_multiplier: Option<f64>,
    pub sort_order: u32,
    pub group_ids: Vec<u64>,
    pub remark: String,
    pub external_source: String,
    pub external_rule_id: String,
}

/// Flat field set used to rebuild a rule from persisted storage. The
/// persistence mapper is responsible for reassembling the variable-length
/// collections (`chain_agent_ids`, `chain_port_config`, `exit_agents`,
/// `group_ids`) verbatim.
#[allow(clippy::too_many_arguments)]
#[derive(Debug, Clone)]
pub struct ForwardRuleRecord {
    pub id: u64,
    pub sid: String,
    pub user_id: Option<u64>,
    pub subscription_id: Option<u64>,
    pub rule_type: ForwardRuleType,
    pub agent_id: u64,
    pub exit_agent_id: u64,
    pub exit_agents: Vec<AgentWeight>,
    pub load_balance_strategy: LoadBalanceStrategy,
    pub chain_agent_ids: Vec<u64>,
    pub chain_port_config: HashMap<u64, u16>,
    pub tunnel_hops: Option<u32>,
    pub tunnel_type: TunnelType,
    pub listen_port: u16,
    pub target_address: String,
    pub target_port: u16,
    pub target_node_id: u64,
    pub bind_ip: String,
    pub ip_version: IpVersion,
    pub protocol: ForwardProtocol,
    pub server_address: String,
    pub external_source: String,
    pub external_rule_id: String,
    pub status: ForwardStatus,
    pub upload_bytes: i64,
    pub download_bytes: i64,
    pub traffic_multiplier: Option<f64>,
    pub sort_order: u32,
    pub group_ids: Vec<u64>,
    pub remark: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One forwarding configuration: an entry listen port and the path of agents
/// and/or a target it relays to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardRule {
    id: u64,
    sid: String,
    user_id: Option<u64>,
    subscription_id: Option<u64>,
    rule_type: ForwardRuleType,
    agent_id: u64,
    exit_agent_id: u64,
    exit_agents: Vec<AgentWeight>,
    load_balance_strategy: LoadBalanceStrategy,
    chain_agent_ids: Vec<u64>,
    chain_port_config: HashMap<u64, u16>,
    tunnel_hops: Option<u32>,
    tunnel_type: TunnelType,
    listen_port: u16,
    target_address: String,
    target_port: u16,
    target_node_id: u64,
    bind_ip: String,
    ip_version: IpVersion,
    protocol: ForwardProtocol,
    server_address: String,
    external_source: String,
    external_rule_id: String,
    status: ForwardStatus,
    upload_bytes: i64,
    download_bytes: i64,
    traffic_multiplier: Option<f64>,
    sort_order: u32,
    group_ids: Vec<u64>,
    remark: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ForwardRule {
    /// Construct a `Direct` / `Entry` / `Chain` / `DirectChain` rule.
    pub fn new(
        rule_type: ForwardRuleType,
        agent_id: u64,
        listen_port: u16,
        protocol: ForwardProtocol,
        target: Target,
        options: ForwardRuleOptions,
        sid_generator: &dyn SidGenerator,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        if rule_type.is_external() {
            return Err(DomainError::ValidationError(
                "use new_external to construct an external rule".to_string(),
            ));
        }

        let (target_address, target_port, target_node_id) = match target {
            Target::Static { address, port } => (address, port, 0),
            Target::Node(id) => (String::new(), 0, id),
        };

        let now = clock.now();
        let rule = ForwardRule {
            id: 0,
            sid: sid_generator.generate("fr"),
            user_id: options.user_id,
            subscription_id: options.subscription_id,
            rule_type,
            agent_id,
            exit_agent_id: options.exit_agent_id,
            exit_agents: options.exit_agents,
            load_balance_strategy: options.load_balance_strategy,
            chain_agent_ids: options.chain_agent_ids,
            chain_port_config: options.chain_port_config,
            tunnel_hops: options.tunnel_hops,
            tunnel_type: options.tunnel_type,
            listen_port,
            target_address,
            target_port,
            target_node_id,
            bind_ip: options.bind_ip,
            ip_version: options.ip_version,
            protocol,
            server_address: String::new(),
            external_source: String::new(),
            external_rule_id: String::new(),
            status: ForwardStatus::Disabled,
            upload_bytes: 0,
            download_bytes: 0,
            traffic_multiplier: options.traffic_multiplier,
            sort_order: options.sort_order,
            group_ids: options.group_ids,
            remark: options.remark,
            created_at: now,
            updated_at: now,
        };

        validator::validate(&rule)?;
        Ok(rule)
    }

    /// Construct an `External` rule: no agents in this plane, just a target
    /// node and the third-party server address handling it.
    pub fn new_external(
        listen_port: u16,
        protocol: ForwardProtocol,
        target_node_id: u64,
        server_address: impl Into<String>,
        options: ForwardRuleOptions,
        sid_generator: &dyn SidGenerator,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        let now = clock.now();
        let rule = ForwardRule {
            id: 0,
            sid: sid_generator.generate("fr"),
            user_id: options.user_id,
            subscription_id: options.subscription_id,
            rule_type: ForwardRuleType::External,
            agent_id: 0,
            exit_agent_id: 0,
            exit_agents: Vec::new(),
            load_balance_strategy: options.load_balance_strategy,
            chain_agent_ids: Vec::new(),
            chain_port_config: HashMap::new(),
            tunnel_hops: None,
            tunnel_type: options.tunnel_type,
            listen_port,
            target_address: String::new(),
            target_port: 0,
            target_node_id,
            bind_ip: options.bind_ip,
            ip_version: options.ip_version,
            protocol,
            server_address: server_address.into(),
            external_source: options.external_source,
            external_rule_id: options.external_rule_id,
            status: ForwardStatus::Enabled,
            upload_bytes: 0,
            download_bytes: 0,
            traffic_multiplier: options.traffic_multiplier,
            sort_order: options.sort_order,
            group_ids: options.group_ids,
            remark: options.remark,
            created_at: now,
            updated_at: now,
        };

        validator::validate(&rule)?;
        Ok(rule)
    }

    /// Rebuild a rule from a persisted record, re-running validation to
    /// surface data corruption.
    pub fn reconstruct(record: ForwardRuleRecord) -> Result<Self, DomainError> {
        let rule = ForwardRule {
            id: record.id,
            sid: record.sid,
            user_id: record.user_id,
            subscription_id: record.subscription_id,
            rule_type: record.rule_type,
            agent_id: record.agent_id,
            exit_agent_id: record.exit_agent_id,
            exit_agents: record.exit_agents,
            load_balance_strategy: record.load_balance_strategy,
            chain_agent_ids: record.chain_agent_ids,
            chain_port_config: record.chain_port_config,
            tunnel_hops: record.tunnel_hops,
            tunnel_type: record.tunnel_type,
            listen_port: record.listen_port,
            target_address: record.target_address,
            target_port: record.target_port,
            target_node_id: record.target_node_id,
            bind_ip: record.bind_ip,
            ip_version: record.ip_version,
            protocol: record.protocol,
            server_address: record.server_address,
            external_source: record.external_source,
            external_rule_id: record.external_rule_id,
            status: record.status,
            upload_bytes: record.upload_bytes,
            download_bytes: record.download_bytes,
            traffic_multiplier: record.traffic_multiplier,
            sort_order: record.sort_order,
            group_ids: record.group_ids,
            remark: record.remark,
            created_at: record.created_at,
            updated_at: record.updated_at,
        };

        validator::validate(&rule)?;
        Ok(rule)
    }

    /// The authoritative cross-field checker. Constructors call it on build;
    /// mutators re-run it whenever they change a field that participates in
    /// a cross-field invariant.
    pub fn validate(&self) -> Result<(), DomainError> {
        validator::validate(self)
    }

    // -- accessors --------------------------------------------------------

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Write-once identity assignment performed by the repository on first save.
    pub fn set_id(&mut self, id: u64) -> Result<(), DomainError> {
        if self.id != 0 {
            return Err(DomainError::ValidationError(
                "rule id is already assigned".to_string(),
            ));
        }
        if id == 0 {
            return Err(DomainError::ValidationError(
                "rule id must be non-zero".to_string(),
            ));
        }
        self.id = id;
        Ok(())
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }
    pub fn user_id(&self) -> Option<u64> {
        self.user_id
    }
    pub fn subscription_id(&self) -> Option<u64> {
        self.subscription_id
    }
    pub fn rule_type(&self) -> ForwardRuleType {
        self.rule_type
    }
    pub fn agent_id(&self) -> u64 {
        self.agent_id
    }
    pub fn exit_agent_id(&self) -> u64 {
        self.exit_agent_id
    }
    pub fn exit_agents(&self) -> &[AgentWeight] {
        &self.exit_agents
    }
    pub fn load_balance_strategy(&self) -> LoadBalanceStrategy {
        self.load_balance_strategy
    }
    pub fn chain_agent_ids(&self) -> &[u64] {
        &self.chain_agent_ids
    }
    pub fn chain_port_config(&self) -> &HashMap<u64, u16> {
        &self.chain_port_config
    }
    pub fn tunnel_hops(&self) -> Option<u32> {
        self.tunnel_hops
    }
    pub fn tunnel_type(&self) -> TunnelType {
        self.tunnel_type
    }
    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }
    pub fn target_address(&self) -> &str {
        &self.target_address
    }
    pub fn target_port(&self) -> u16 {
        self.target_port
    }
    pub fn target_node_id(&self) -> u64 {
        self.target_node_id
    }
    pub fn has_target_node(&self) -> bool {
        self.target_node_id != 0
    }
    pub fn bind_ip(&self) -> &str {
        &self.bind_ip
    }
    pub fn ip_version(&self) -> IpVersion {
        self.ip_version
    }
    pub fn protocol(&self) -> ForwardProtocol {
        self.protocol
    }
    pub fn server_address(&self) -> &str {
        &self.server_address
    }
    pub fn external_source(&self) -> &str {
        &self.external_source
    }
    pub fn external_rule_id(&self) -> &str {
        &self.external_rule_id
    }
    pub fn status(&self) -> ForwardStatus {
        self.status
    }
    pub fn traffic_multiplier(&self) -> Option<f64> {
        self.traffic_multiplier
    }
    pub fn sort_order(&self) -> u32 {
        self.sort_order
    }
    pub fn group_ids(&self) -> &[u64] {
        &self.group_ids
    }
    pub fn remark(&self) -> &str {
        &self.remark
    }
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Raw, unscaled accumulated upload counter.
    pub fn raw_upload_bytes(&self) -> i64 {
        self.upload_bytes
    }
    /// Raw, unscaled accumulated download counter.
    pub fn raw_download_bytes(&self) -> i64 {
        self.download_bytes
    }

    /// Accumulated upload traffic scaled by [`Self::effective_multiplier`].
    pub fn upload_bytes(&self) -> i64 {
        scale(self.upload_bytes, self.effective_multiplier())
    }
    /// Accumulated download traffic scaled by [`Self::effective_multiplier`].
    pub fn download_bytes(&self) -> i64 {
        scale(self.download_bytes, self.effective_multiplier())
    }
    /// Sum of scaled upload and download traffic.
    pub fn total_bytes(&self) -> i64 {
        self.upload_bytes() + self.download_bytes()
    }

    // -- navigation ---------------------------------------------------------

    /// Entry agent followed by the chain agents, in hop order.
    fn full_path(&self) -> Vec<u64> {
        let mut path = Vec::with_capacity(self.chain_agent_ids.len() + 1);
        if self.agent_id != 0 {
            path.push(self.agent_id);
        }
        path.extend_from_slice(&self.chain_agent_ids);
        path
    }

    /// 0-indexed position of `agent_id` in the full path, or -1 if absent.
    pub fn chain_position(&self, agent_id: u64) -> i32 {
        self.full_path()
            .iter()
            .position(|&a| a == agent_id)
            .map(|p| p as i32)
            .unwrap_or(-1)
    }

    pub fn is_last_in_chain(&self, agent_id: u64) -> bool {
        self.full_path().last() == Some(&agent_id)
    }

    /// Next agent after `cur` in the full path, or 0 if `cur` is the last
    /// hop or isn't present.
    pub fn next_hop_agent_id(&self, cur: u64) -> u64 {
        let path = self.full_path();
        match path.iter().position(|&a| a == cur) {
            Some(pos) if pos + 1 < path.len() => path[pos + 1],
            _ => 0,
        }
    }

    /// Direct-chain-only successor lookup: the next agent id and the port it
    /// listens on for this hop's traffic.
    pub fn next_hop_for_direct_chain(&self, cur: u64) -> Result<(u64, u16), DomainError> {
        if !self.rule_type.is_direct_chain() {
            return Err(DomainError::ValidationError(
                "next_hop_for_direct_chain only applies to direct_chain rules".to_string(),
            ));
        }

        let path = self.full_path();
        let pos = path
            .iter()
            .position(|&a| a == cur)
            .ok_or_else(|| DomainError::ValidationError(format!("agent {} not in chain", cur)))?;

        if pos + 1 >= path.len() {
            return Ok((0, 0));
        }

        let next = path[pos + 1];
        let port = self.chain_port_config.get(&next).copied().unwrap_or(0);
        if port == 0 {
            return Err(DomainError::ValidationError(format!(
                "missing listen port for chain agent {}",
                next
            )));
        }
        Ok((next, port))
    }

    /// Listen port configured for `agent_id` in `chain_port_config`, if any.
    pub fn agent_listen_port(&self, agent_id: u64) -> Option<u16> {
        self.chain_port_config.get(&agent_id).copied().filter(|&p| p != 0)
    }

    /// Node count used to derive the default traffic multiplier when none
    /// is explicitly set.
    pub fn calculate_node_count(&self) -> usize {
        match self.rule_type {
            ForwardRuleType::Direct => 1,
            ForwardRuleType::Entry => 2,
            ForwardRuleType::Chain => 1 + self.chain_agent_ids.len(),
            ForwardRuleType::DirectChain => 2 + self.chain_agent_ids.len(),
            ForwardRuleType::External => 1,
        }
    }

    pub fn effective_multiplier(&self) -> f64 {
        match self.traffic_multiplier {
            Some(m) => m,
            None => 1.0 / self.calculate_node_count() as f64,
        }
    }

    pub fn is_hybrid_chain(&self) -> bool {
        self.rule_type.is_chain()
            && matches!(self.tunnel_hops, Some(hops) if hops > 0 && (hops as usize) < self.chain_agent_ids.len())
    }

    pub fn needs_tunnel_at_position(&self, pos: usize) -> bool {
        if !self.rule_type.is_chain() {
            return true;
        }
        if self.is_hybrid_chain() {
            pos < self.tunnel_hops.unwrap_or(0) as usize
        } else {
            true
        }
    }

    pub fn hop_mode(&self, pos: usize) -> HopMode {
        if self.rule_type.is_direct_chain() {
            return HopMode::Direct;
        }
        if !self.rule_type.is_chain() {
            return HopMode::Tunnel;
        }
        match self.tunnel_hops {
            Some(hops) if hops > 0 && (hops as usize) < self.chain_agent_ids.len() => {
                let hops = hops as usize;
                match pos.cmp(&hops) {
                    std::cmp::Ordering::Less => HopMode::Tunnel,
                    std::cmp::Ordering::Equal => HopMode::Boundary,
                    std::cmp::Ordering::Greater => HopMode::Direct,
                }
            }
            _ => HopMode::Tunnel,
        }
    }

    // -- mutations ----------------------------------------------------------

    pub fn enable(&mut self, clock: &dyn Clock) {
        if self.status.is_enabled() {
            return;
        }
        self.status = ForwardStatus::Enabled;
        self.touch(clock);
        tracing::debug!(rule_id = self.id, sid = %self.sid, "rule enabled");
    }

    pub fn disable(&mut self, clock: &dyn Clock) {
        if self.status.is_disabled() {
            return;
        }
        self.status = ForwardStatus::Disabled;
        self.touch(clock);
        tracing::debug!(rule_id = self.id, sid = %self.sid, "rule disabled");
    }

    pub fn update_listen_port(&mut self, port: u16, clock: &dyn Clock) -> Result<(), DomainError> {
        if port == self.listen_port {
            return Ok(());
        }
        let previous = self.listen_port;
        self.listen_port = port;
        if let Err(e) = validator::validate(self) {
            self.listen_port = previous;
            return Err(e);
        }
        self.touch(clock);
        Ok(())
    }

    /// Point the rule at a static address/port, clearing `target_node_id`.
    /// Not valid for `external` rules, which always target a node.
    pub fn update_target(
        &mut self,
        address: impl Into<String>,
        port: u16,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.rule_type.is_external() {
            return Err(DomainError::ValidationError(
                "external rules cannot target a static address".to_string(),
            ));
        }
        let address = address.into();
        if address == self.target_address && port == self.target_port && self.target_node_id == 0 {
            return Ok(());
        }
        let previous = (self.target_address.clone(), self.target_port, self.target_node_id);
        self.target_address = address;
        self.target_port = port;
        self.target_node_id = 0;
        if let Err(e) = validator::validate(self) {
            (self.target_address, self.target_port, self.target_node_id) = previous;
            return Err(e);
        }
        self.touch(clock);
        Ok(())
    }

    /// Point the rule at another node, clearing the static target. Valid
    /// only for `direct`/`entry`/`chain`/`direct_chain`; external rules
    /// manage their target node through construction, not this mutator.
    pub fn update_target_node_id(&mut self, node_id: u64, clock: &dyn Clock) -> Result<(), DomainError> {
        if self.rule_type.is_external() {
            return Err(DomainError::ValidationError(
                "use a dedicated external-rule mutator, not update_target_node_id".to_string(),
            ));
        }
        if node_id == self.target_node_id && self.target_address.is_empty() && self.target_port == 0 {
            return Ok(());
        }
        let previous = (self.target_address.clone(), self.target_port, self.target_node_id);
        self.target_address = String::new();
        self.target_port = 0;
        self.target_node_id = node_id;
        if let Err(e) = validator::validate(self) {
            (self.target_address, self.target_port, self.target_node_id) = previous;
            return Err(e);
        }
        self.touch(clock);
        Ok(())
    }

    pub fn update_ip_version(&mut self, ip_version: IpVersion, clock: &dyn Clock) {
        if ip_version == self.ip_version {
            return;
        }
        self.ip_version = ip_version;
        self.touch(clock);
    }

    pub fn update_protocol(&mut self, protocol: ForwardProtocol, clock: &dyn Clock) {
        if protocol == self.protocol {
            return;
        }
        self.protocol = protocol;
        self.touch(clock);
    }

    pub fn update_remark(&mut self, remark: impl Into<String>, clock: &dyn Clock) {
        let remark = remark.into();
        if remark == self.remark {
            return;
        }
        self.remark = remark;
        self.touch(clock);
    }

    pub fn update_bind_ip(&mut self, bind_ip: impl Into<String>, clock: &dyn Clock) -> Result<(), DomainError> {
        let bind_ip = bind_ip.into();
        if bind_ip == self.bind_ip {
            return Ok(());
        }
        let previous = std::mem::replace(&mut self.bind_ip, bind_ip);
        if let Err(e) = validator::validate(self) {
            self.bind_ip = previous;
            return Err(e);
        }
        self.touch(clock);
        Ok(())
    }

    pub fn update_traffic_multiplier(
        &mut self,
        multiplier: Option<f64>,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if multiplier == self.traffic_multiplier {
            return Ok(());
        }
        let previous = self.traffic_multiplier;
        self.traffic_multiplier = multiplier;
        if let Err(e) = validator::validate(self) {
            self.traffic_multiplier = previous;
            return Err(e);
        }
        self.touch(clock);
        Ok(())
    }

    pub fn update_sort_order(&mut self, sort_order: u32, clock: &dyn Clock) {
        if sort_order == self.sort_order {
            return;
        }
        self.sort_order = sort_order;
        self.touch(clock);
    }

    /// Forbids collision with any `chain_agent_ids` element on chain/direct_chain rules.
    pub fn update_agent_id(&mut self, agent_id: u64, clock: &dyn Clock) -> Result<(), DomainError> {
        if agent_id == self.agent_id {
            return Ok(());
        }
        let previous = self.agent_id;
        self.agent_id = agent_id;
        if let Err(e) = validator::validate(self) {
            self.agent_id = previous;
            return Err(e);
        }
        self.touch(clock);
        Ok(())
    }

    /// Switches to single-exit mode, clearing `exit_agents`.
    pub fn update_exit_agent_id(&mut self, exit_agent_id: u64, clock: &dyn Clock) -> Result<(), DomainError> {
        if !self.rule_type.is_entry() {
            return Err(DomainError::ValidationError(
                "exit_agent_id only applies to entry rules".to_string(),
            ));
        }
        if exit_agent_id == self.exit_agent_id && self.exit_agents.is_empty() {
            return Ok(());
        }
        let previous = (self.exit_agent_id, std::mem::take(&mut self.exit_agents));
        self.exit_agent_id = exit_agent_id;
        self.exit_agents = Vec::new();
        if let Err(e) = validator::validate(self) {
            (self.exit_agent_id, self.exit_agents) = previous;
            return Err(e);
        }
        self.touch(clock);
        Ok(())
    }

    /// Switches to weighted-exit mode, clearing `exit_agent_id`.
    pub fn update_exit_agents(&mut self, exit_agents: Vec<AgentWeight>, clock: &dyn Clock) -> Result<(), DomainError> {
        if !self.rule_type.is_entry() {
            return Err(DomainError::ValidationError(
                "exit_agents only applies to entry rules".to_string(),
            ));
        }
        if exit_agents == self.exit_agents && self.exit_agent_id == 0 {
            return Ok(());
        }
        let previous = (self.exit_agent_id, std::mem::replace(&mut self.exit_agents, exit_agents));
        self.exit_agent_id = 0;
        if let Err(e) = validator::validate(self) {
            (self.exit_agent_id, self.exit_agents) = previous;
            return Err(e);
        }
        self.touch(clock);
        Ok(())
    }

    pub fn update_load_balance_strategy(
        &mut self,
        strategy: LoadBalanceStrategy,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if !self.rule_type.is_entry() {
            return Err(DomainError::ValidationError(
                "load_balance_strategy only applies to entry rules".to_string(),
            ));
        }
        if strategy == self.load_balance_strategy {
            return Ok(());
        }
        let previous = self.load_balance_strategy;
        self.load_balance_strategy = strategy;
        if let Err(e) = validator::validate(self) {
            self.load_balance_strategy = previous;
            return Err(e);
        }
        self.touch(clock);
        Ok(())
    }

    pub fn update_tunnel_type(&mut self, tunnel_type: TunnelType, clock: &dyn Clock) {
        if tunnel_type == self.tunnel_type {
            return;
        }
        self.tunnel_type = tunnel_type;
        self.touch(clock);
    }

    /// Chain-only. Validates port config coverage for positions at or past
    /// the new boundary.
    pub fn update_tunnel_hops(&mut self, tunnel_hops: Option<u32>, clock: &dyn Clock) -> Result<(), DomainError> {
        if !self.rule_type.is_chain() {
            return Err(DomainError::ValidationError(
                "tunnel_hops only applies to chain rules".to_string(),
            ));
        }
        if tunnel_hops == self.tunnel_hops {
            return Ok(());
        }
        let previous = self.tunnel_hops;
        self.tunnel_hops = tunnel_hops;
        if let Err(e) = validator::validate(self) {
            self.tunnel_hops = previous;
            return Err(e);
        }
        self.touch(clock);
        Ok(())
    }

    pub fn update_chain_agent_ids(&mut self, chain_agent_ids: Vec<u64>, clock: &dyn Clock) -> Result<(), DomainError> {
        if !self.rule_type.requires_chain_agents() {
            return Err(DomainError::ValidationError(
                "chain_agent_ids only applies to chain and direct_chain rules".to_string(),
            ));
        }
        if chain_agent_ids == self.chain_agent_ids {
            return Ok(());
        }
        let previous = std::mem::replace(&mut self.chain_agent_ids, chain_agent_ids);
        if let Err(e) = validator::validate(self) {
            self.chain_agent_ids = previous;
            return Err(e);
        }
        self.touch(clock);
        Ok(())
    }

    pub fn update_chain_port_config(
        &mut self,
        chain_port_config: HashMap<u64, u16>,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if !self.rule_type.requires_chain_agents() {
            return Err(DomainError::ValidationError(
                "chain_port_config only applies to chain and direct_chain rules".to_string(),
            ));
        }
        if chain_port_config == self.chain_port_config {
            return Ok(());
        }
        let previous = std::mem::replace(&mut self.chain_port_config, chain_port_config);
        if let Err(e) = validator::validate(self) {
            self.chain_port_config = previous;
            return Err(e);
        }
        self.touch(clock);
        Ok(())
    }

    /// Atomic update of both chain fields together; preferred over the
    /// individual setters for `direct_chain` edits since the two must agree.
    pub fn update_direct_chain_config(
        &mut self,
        chain_agent_ids: Vec<u64>,
        chain_port_config: HashMap<u64, u16>,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if !self.rule_type.is_direct_chain() {
            return Err(DomainError::ValidationError(
                "update_direct_chain_config only applies to direct_chain rules".to_string(),
            ));
        }
        if chain_agent_ids == self.chain_agent_ids && chain_port_config == self.chain_port_config {
            return Ok(());
        }
        let previous = (
            std::mem::replace(&mut self.chain_agent_ids, chain_agent_ids),
            std::mem::replace(&mut self.chain_port_config, chain_port_config),
        );
        if let Err(e) = validator::validate(self) {
            (self.chain_agent_ids, self.chain_port_config) = previous;
            return Err(e);
        }
        self.touch(clock);
        Ok(())
    }

    pub fn set_group_ids(&mut self, group_ids: Vec<u64>, clock: &dyn Clock) {
        if group_ids == self.group_ids {
            return;
        }
        self.group_ids = group_ids;
        self.touch(clock);
    }

    pub fn add_group_id(&mut self, group_id: u64, clock: &dyn Clock) {
        if self.group_ids.contains(&group_id) {
            return;
        }
        self.group_ids.push(group_id);
        self.touch(clock);
    }

    pub fn remove_group_id(&mut self, group_id: u64, clock: &dyn Clock) {
        let before = self.group_ids.len();
        self.group_ids.retain(|&g| g != group_id);
        if self.group_ids.len() != before {
            self.touch(clock);
        }
    }

    pub fn has_group_id(&self, group_id: u64) -> bool {
        self.group_ids.contains(&group_id)
    }

    pub fn update_server_address(
        &mut self,
        server_address: impl Into<String>,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let server_address = server_address.into();
        if server_address == self.server_address {
            return Ok(());
        }
        let previous = std::mem::replace(&mut self.server_address, server_address);
        if let Err(e) = validator::validate(self) {
            self.server_address = previous;
            return Err(e);
        }
        self.touch(clock);
        Ok(())
    }

    pub fn update_external_source(&mut self, external_source: impl Into<String>, clock: &dyn Clock) {
        let external_source = external_source.into();
        if external_source == self.external_source {
            return;
        }
        self.external_source = external_source;
        self.touch(clock);
    }

    pub fn update_external_rule_id(&mut self, external_rule_id: impl Into<String>, clock: &dyn Clock) {
        let external_rule_id = external_rule_id.into();
        if external_rule_id == self.external_rule_id {
            return;
        }
        self.external_rule_id = external_rule_id;
        self.touch(clock);
    }

    /// Accumulates into the raw counters; does not scale. Always bumps
    /// `updated_at` since recorded traffic is itself an observable change.
    pub fn record_traffic(&mut self, up: i64, down: i64, clock: &dyn Clock) {
        self.upload_bytes += up;
        self.download_bytes += down;
        self.touch(clock);
    }

    pub fn reset_traffic(&mut self, clock: &dyn Clock) {
        if self.upload_bytes == 0 && self.download_bytes == 0 {
            return;
        }
        self.upload_bytes = 0;
        self.download_bytes = 0;
        self.touch(clock);
    }

    fn touch(&mut self, clock: &dyn Clock) {
        self.updated_at = clock.now();
    }
}

fn scale(raw: i64, multiplier: f64) -> i64 {
    (raw as f64 * multiplier).trunc() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::clock::UtcClock;
    use crate::forward::sid::RandomSidGenerator;

    fn direct_rule() -> ForwardRule {
        ForwardRule::new(
            ForwardRuleType::Direct,
            1,
            8080,
            ForwardProtocol::Tcp,
            Target::Static {
                address: "192.168.1.100".to_string(),
                port: 9000,
            },
            ForwardRuleOptions::default(),
            &RandomSidGenerator,
            &UtcClock,
        )
        .unwrap()
    }

    #[test]
    fn s1_direct_rule_happy_path() {
        let rule = direct_rule();
        assert!(rule.validate().is_ok());
        assert!(rule.status().is_disabled());
        assert!(!rule.has_target_node());
        assert_eq!(rule.calculate_node_count(), 1);
        assert_eq!(rule.effective_multiplier(), 1.0);
    }

    #[test]
    fn s2_entry_rule_exit_equals_entry_rejected() {
        let result = ForwardRule::new(
            ForwardRuleType::Entry,
            1,
            8080,
            ForwardProtocol::Tcp,
            Target::Static {
                address: "10.0.0.1".to_string(),
                port: 80,
            },
            ForwardRuleOptions {
                exit_agent_id: 1,
                ..Default::default()
            },
            &RandomSidGenerator,
            &UtcClock,
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("exit agent cannot be the same as entry agent"), "{err}");
    }

    #[test]
    fn s3_chain_rule_duplicate_agent_rejected() {
        let result = ForwardRule::new(
            ForwardRuleType::Chain,
            1,
            8080,
            ForwardProtocol::Tcp,
            Target::Static {
                address: "10.0.0.1".to_string(),
                port: 80,
            },
            ForwardRuleOptions {
                chain_agent_ids: vec![2, 3, 2],
                ..Default::default()
            },
            &RandomSidGenerator,
            &UtcClock,
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("duplicate agent ID: 2"), "{err}");
    }

    #[test]
    fn s4_direct_chain_port_config_exact() {
        let mut config = HashMap::new();
        config.insert(2, 7001);
        config.insert(3, 7002);
        config.insert(4, 7003);

        let rule = ForwardRule::new(
            ForwardRuleType::DirectChain,
            1,
            8080,
            ForwardProtocol::Tcp,
            Target::Static {
                address: "10.0.0.1".to_string(),
                port: 80,
            },
            ForwardRuleOptions {
                chain_agent_ids: vec![2, 3, 4],
                chain_port_config: config,
                ..Default::default()
            },
            &RandomSidGenerator,
            &UtcClock,
        )
        .unwrap();

        assert_eq!(rule.agent_listen_port(3), Some(7002));
        assert_eq!(rule.next_hop_for_direct_chain(3).unwrap(), (4, 7003));
        assert_eq!(rule.next_hop_for_direct_chain(4).unwrap(), (0, 0));
    }

    #[test]
    fn s5_traffic_multiplier_truncation() {
        let mut rule = ForwardRule::new(
            ForwardRuleType::Entry,
            1,
            8080,
            ForwardProtocol::Tcp,
            Target::Static {
                address: "10.0.0.1".to_string(),
                port: 80,
            },
            ForwardRuleOptions {
                exit_agent_id: 2,
                traffic_multiplier: Some(0.3333),
                ..Default::default()
            },
            &RandomSidGenerator,
            &UtcClock,
        )
        .unwrap();

        rule.record_traffic(1500, 0, &UtcClock);
        assert_eq!(rule.upload_bytes(), 499);
        assert_eq!(rule.raw_upload_bytes(), 1500);
    }

    #[test]
    fn idempotent_enable_does_not_bump_updated_at_twice() {
        let mut rule = direct_rule();
        rule.enable(&UtcClock);
        let after_first = rule.updated_at();
        rule.enable(&UtcClock);
        assert_eq!(rule.updated_at(), after_first);
    }

    #[test]
    fn chain_navigation_positions_and_next_hop() {
        let rule = ForwardRule::new(
            ForwardRuleType::Chain,
            1,
            8080,
            ForwardProtocol::Tcp,
            Target::Static {
                address: "10.0.0.1".to_string(),
                port: 80,
            },
            ForwardRuleOptions {
                chain_agent_ids: vec![2, 3, 4],
                ..Default::default()
            },
            &RandomSidGenerator,
            &UtcClock,
        )
        .unwrap();

        assert_eq!(rule.chain_position(1), 0);
        assert_eq!(rule.chain_position(3), 2);
        assert_eq!(rule.chain_position(99), -1);
        assert_eq!(rule.next_hop_agent_id(3), 4);
        assert_eq!(rule.next_hop_agent_id(4), 0);
        assert!(rule.is_last_in_chain(4));
    }

    #[test]
    fn hybrid_chain_hop_mode_transitions() {
        let mut config = HashMap::new();
        config.insert(4, 7004);

        let rule = ForwardRule::new(
            ForwardRuleType::Chain,
            1,
            8080,
            ForwardProtocol::Tcp,
            Target::Static {
                address: "10.0.0.1".to_string(),
                port: 80,
            },
            ForwardRuleOptions {
                chain_agent_ids: vec![2, 3, 4],
                tunnel_hops: Some(2),
                chain_port_config: config,
                ..Default::default()
            },
            &RandomSidGenerator,
            &UtcClock,
        )
        .unwrap();

        assert!(rule.is_hybrid_chain());
        assert_eq!(rule.hop_mode(0), HopMode::Tunnel);
        assert_eq!(rule.hop_mode(1), HopMode::Tunnel);
        assert_eq!(rule.hop_mode(2), HopMode::Boundary);
        assert!(rule.needs_tunnel_at_position(1));
        assert!(!rule.needs_tunnel_at_position(2));
    }

    #[test]
    fn entry_only_mutators_reject_other_rule_types() {
        let mut rule = direct_rule();
        assert!(rule.update_exit_agent_id(2, &UtcClock).is_err());
        assert!(rule.update_exit_agents(vec![], &UtcClock).is_err());
        assert!(rule
            .update_load_balance_strategy(LoadBalanceStrategy::RoundRobin, &UtcClock)
            .is_err());
    }

    #[test]
    fn chain_only_mutators_reject_other_rule_types() {
        let mut rule = direct_rule();
        assert!(rule.update_tunnel_hops(Some(1), &UtcClock).is_err());
        assert!(rule.update_chain_agent_ids(vec![2], &UtcClock).is_err());
        assert!(rule
            .update_chain_port_config(HashMap::new(), &UtcClock)
            .is_err());
        assert!(rule
            .update_direct_chain_config(vec![2], HashMap::new(), &UtcClock)
            .is_err());
    }
}
