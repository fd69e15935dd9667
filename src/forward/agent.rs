//! `ForwardAgent` aggregate: a managed forwarding node

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::address;
use super::clock::Clock;
use super::errors::DomainError;
use super::sid::SidGenerator;
use super::token::TokenGenerator;
use super::value_objects::{ForwardStatus, PortRange};

/// A managed forwarding node: the thing that actually opens sockets.
///
/// `id` is a persistence detail (0 until first saved); `sid` is the stable
/// external identifier handed to API clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardAgent {
    id: u64,
    sid: String,
    name: String,
    token_hash: String,
    api_token: String,
    status: ForwardStatus,
    public_address: String,
    tunnel_address: String,
    remark: String,
    group_id: Option<u64>,
    agent_version: String,
    platform: String,
    arch: String,
    allowed_port_range: Option<PortRange>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ForwardAgent {
    /// Construct a brand-new agent: validates addresses, mints a SID, and
    /// generates a fresh API token. The plain token is cached so the caller
    /// can hand it to the agent once; it is never recoverable afterwards.
    pub fn new(
        name: impl Into<String>,
        public_address: impl Into<String>,
        tunnel_address: impl Into<String>,
        sid_generator: &dyn SidGenerator,
        token_generator: &dyn TokenGenerator,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        let public_address = public_address.into();
        let tunnel_address = tunnel_address.into();

        validate_name(&name)?;
        validate_public_address(&public_address)?;
        validate_tunnel_address(&tunnel_address)?;

        let (api_token, token_hash) = token_generator.generate_api_token("fpa");
        let now = clock.now();

        Ok(ForwardAgent {
            id: 0,
            sid: sid_generator.generate("fa"),
            name,
            token_hash,
            api_token,
            status: ForwardStatus::Enabled,
            public_address,
            tunnel_address,
            remark: String::new(),
            group_id: None,
            agent_version: String::new(),
            platform: String::new(),
            arch: String::new(),
            allowed_port_range: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuild an agent from persisted fields. Re-validates but does not
    /// regenerate the SID or token.
    #[allow(clippy::too_many_arguments)]
    pub fn reconstruct(
        id: u64,
        sid: String,
        name: String,
        token_hash: String,
        api_token: String,
        status: ForwardStatus,
        public_address: String,
        tunnel_address: String,
        remark: String,
        group_id: Option<u64>,
        agent_version: String,
        platform: String,
        arch: String,
        allowed_port_range: Option<PortRange>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        validate_name(&name)?;
        validate_public_address(&public_address)?;
        validate_tunnel_address(&tunnel_address)?;
        if token_hash.is_empty() {
            return Err(DomainError::ValidationError(
                "token hash must not be empty".to_string(),
            ));
        }
        if let Some(range) = &allowed_port_range {
            range.validate()?;
        }

        Ok(ForwardAgent {
            id,
            sid,
            name,
            token_hash,
            api_token,
            status,
            public_address,
            tunnel_address,
            remark,
            group_id,
            agent_version,
            platform,
            arch,
            allowed_port_range,
            created_at,
            updated_at,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ForwardStatus {
        self.status
    }

    pub fn public_address(&self) -> &str {
        &self.public_address
    }

    pub fn tunnel_address(&self) -> &str {
        &self.tunnel_address
    }

    pub fn remark(&self) -> &str {
        &self.remark
    }

    pub fn group_id(&self) -> Option<u64> {
        self.group_id
    }

    pub fn agent_version(&self) -> &str {
        &self.agent_version
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn allowed_port_range(&self) -> Option<PortRange> {
        self.allowed_port_range
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn api_token(&self) -> &str {
        &self.api_token
    }

    pub fn token_hash(&self) -> &str {
        &self.token_hash
    }

    /// Write-once identity assignment performed by the repository on first save.
    pub fn set_id(&mut self, id: u64) -> Result<(), DomainError> {
        if self.id != 0 {
            return Err(DomainError::ValidationError(
                "agent id is already assigned".to_string(),
            ));
        }
        if id == 0 {
            return Err(DomainError::ValidationError(
                "agent id must be non-zero".to_string(),
            ));
        }
        self.id = id;
        Ok(())
    }

    pub fn enable(&mut self, clock: &dyn Clock) {
        if self.status.is_enabled() {
            return;
        }
        self.status = ForwardStatus::Enabled;
        self.touch(clock);
        tracing::debug!(agent_id = self.id, sid = %self.sid, "agent enabled");
    }

    pub fn disable(&mut self, clock: &dyn Clock) {
        if self.status.is_disabled() {
            return;
        }
        self.status = ForwardStatus::Disabled;
        self.touch(clock);
        tracing::debug!(agent_id = self.id, sid = %self.sid, "agent disabled");
    }

    pub fn update_name(&mut self, name: impl Into<String>, clock: &dyn Clock) -> Result<(), DomainError> {
        let name = name.into();
        if name == self.name {
            return Ok(());
        }
        validate_name(&name)?;
        self.name = name;
        self.touch(clock);
        Ok(())
    }

    pub fn update_remark(&mut self, remark: impl Into<String>, clock: &dyn Clock) {
        let remark = remark.into();
        if remark == self.remark {
            return;
        }
        self.remark = remark;
        self.touch(clock);
    }

    pub fn update_public_address(
        &mut self,
        address: impl Into<String>,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let address = address.into();
        if address == self.public_address {
            return Ok(());
        }
        validate_public_address(&address)?;
        self.public_address = address;
        self.touch(clock);
        Ok(())
    }

    pub fn update_tunnel_address(
        &mut self,
        address: impl Into<String>,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        let address = address.into();
        if address == self.tunnel_address {
            return Ok(());
        }
        validate_tunnel_address(&address)?;
        self.tunnel_address = address;
        self.touch(clock);
        Ok(())
    }

    /// Replace the cached plain token and its hash, e.g. after rotation.
    pub fn set_api_token(&mut self, plain: impl Into<String>, hash: impl Into<String>, clock: &dyn Clock) {
        self.api_token = plain.into();
        self.token_hash = hash.into();
        self.touch(clock);
        tracing::info!(agent_id = self.id, sid = %self.sid, "agent API token rotated");
    }

    pub fn set_group_id(&mut self, group_id: Option<u64>, clock: &dyn Clock) {
        if group_id == self.group_id {
            return;
        }
        self.group_id = group_id;
        self.touch(clock);
    }

    pub fn set_allowed_port_range(
        &mut self,
        range: Option<PortRange>,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if range == self.allowed_port_range {
            return Ok(());
        }
        if let Some(r) = &range {
            r.validate()?;
        }
        self.allowed_port_range = range;
        self.touch(clock);
        Ok(())
    }

    pub fn update_metadata(
        &mut self,
        agent_version: impl Into<String>,
        platform: impl Into<String>,
        arch: impl Into<String>,
        clock: &dyn Clock,
    ) {
        let agent_version = agent_version.into();
        let platform = platform.into();
        let arch = arch.into();
        if agent_version == self.agent_version && platform == self.platform && arch == self.arch {
            return;
        }
        self.agent_version = agent_version;
        self.platform = platform;
        self.arch = arch;
        self.touch(clock);
    }

    /// Hash `plain` and compare against the stored hash in constant time.
    pub fn verify_api_token(&self, plain: &str, token_generator: &dyn TokenGenerator) -> bool {
        token_generator.verify_token(plain, &self.token_hash)
    }

    pub fn has_token(&self) -> bool {
        !self.api_token.is_empty()
    }

    pub fn is_port_allowed(&self, port: u16) -> bool {
        match &self.allowed_port_range {
            None => true,
            Some(range) => range.contains(port),
        }
    }

    /// Address peer agents should connect to: the tunnel address if set,
    /// falling back to the public address.
    pub fn effective_tunnel_address(&self) -> &str {
        if !self.tunnel_address.is_empty() {
            &self.tunnel_address
        } else {
            &self.public_address
        }
    }

    fn touch(&mut self, clock: &dyn Clock) {
        self.updated_at = clock.now();
    }
}

fn validate_name(name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::ValidationError(
            "agent name must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Accepts any parseable IP or RFC-1123 hostname, including loopback: an
/// entry agent may legitimately point at its own machine.
pub fn validate_public_address(value: &str) -> Result<(), DomainError> {
    if value.is_empty() {
        return Ok(());
    }
    if address::is_valid_host(value) {
        Ok(())
    } else {
        Err(DomainError::ValidationError(format!(
            "invalid public address: {}",
            value
        )))
    }
}

/// Like [`validate_public_address`] but rejects loopback IPs and `localhost`:
/// the tunnel address is used by other agents to reach this one over the network.
pub fn validate_tunnel_address(value: &str) -> Result<(), DomainError> {
    if value.is_empty() {
        return Ok(());
    }
    if !address::is_valid_host(value) {
        return Err(DomainError::ValidationError(format!(
            "invalid tunnel address: {}",
            value
        )));
    }
    if address::is_loopback(value) {
        return Err(DomainError::ValidationError(
            "loopback address not allowed".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::clock::UtcClock;
    use crate::forward::sid::RandomSidGenerator;
    use crate::forward::token::Sha256TokenGenerator;

    fn collaborators() -> (RandomSidGenerator, Sha256TokenGenerator, UtcClock) {
        (RandomSidGenerator, Sha256TokenGenerator, UtcClock)
    }

    #[test]
    fn new_agent_is_enabled_with_sid_and_token() {
        let (sid_gen, token_gen, clock) = collaborators();
        let agent = ForwardAgent::new("edge-1", "203.0.113.10", "tunnel.example.com", &sid_gen, &token_gen, &clock)
            .unwrap();
        assert!(agent.status().is_enabled());
        assert!(agent.sid().starts_with("fa_"));
        assert!(agent.has_token());
        assert!(agent.verify_api_token(agent.api_token(), &token_gen));
    }

    #[test]
    fn rejects_empty_name() {
        let (sid_gen, token_gen, clock) = collaborators();
        let result = ForwardAgent::new("", "203.0.113.10", "tunnel.example.com", &sid_gen, &token_gen, &clock);
        assert!(result.is_err());
    }

    #[test]
    fn tunnel_address_rejects_loopback_but_public_allows_it() {
        let (sid_gen, token_gen, clock) = collaborators();
        let result = ForwardAgent::new("edge-1", "127.0.0.1", "127.0.0.1", &sid_gen, &token_gen, &clock);
        assert!(result.is_err());

        let agent = ForwardAgent::new("edge-1", "127.0.0.1", "tunnel.example.com", &sid_gen, &token_gen, &clock)
            .unwrap();
        assert_eq!(agent.public_address(), "127.0.0.1");
    }

    #[test]
    fn enable_disable_idempotent_on_updated_at() {
        let (sid_gen, token_gen, clock) = collaborators();
        let mut agent =
            ForwardAgent::new("edge-1", "", "", &sid_gen, &token_gen, &clock).unwrap();
        agent.disable(&clock);
        let after_first = agent.updated_at();
        agent.disable(&clock);
        assert_eq!(agent.updated_at(), after_first);
    }

    #[test]
    fn set_id_is_write_once() {
        let (sid_gen, token_gen, clock) = collaborators();
        let mut agent =
            ForwardAgent::new("edge-1", "", "", &sid_gen, &token_gen, &clock).unwrap();
        assert!(agent.set_id(0).is_err());
        assert!(agent.set_id(42).is_ok());
        assert_eq!(agent.id(), 42);
        assert!(agent.set_id(43).is_err());
    }

    #[test]
    fn is_port_allowed_with_and_without_range() {
        let (sid_gen, token_gen, clock) = collaborators();
        let mut agent =
            ForwardAgent::new("edge-1", "", "", &sid_gen, &token_gen, &clock).unwrap();
        assert!(agent.is_port_allowed(8080));

        agent
            .set_allowed_port_range(Some(PortRange::new(1000, 2000).unwrap()), &clock)
            .unwrap();
        assert!(agent.is_port_allowed(1500));
        assert!(!agent.is_port_allowed(8080));
    }

    #[test]
    fn effective_tunnel_address_prefers_tunnel_over_public() {
        let (sid_gen, token_gen, clock) = collaborators();
        let agent = ForwardAgent::new("edge-1", "203.0.113.10", "tunnel.example.com", &sid_gen, &token_gen, &clock)
            .unwrap();
        assert_eq!(agent.effective_tunnel_address(), "tunnel.example.com");

        let agent2 =
            ForwardAgent::new("edge-1", "203.0.113.10", "", &sid_gen, &token_gen, &clock).unwrap();
        assert_eq!(agent2.effective_tunnel_address(), "203.0.113.10");
    }
}
