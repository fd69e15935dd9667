//! Test doubles for the forward domain's injected collaborators
//!
//! Usable both by this crate's own unit tests and by downstream
//! application-layer tests that need a deterministic clock, id sequence, or
//! an in-memory repository.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::clock::Clock;
use super::sid::SidGenerator;
use super::token::TokenGenerator;

/// Clock that always reports the same instant, set at construction.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        FixedClock(at)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// SID generator that yields `<prefix>_0001`, `<prefix>_0002`, ... so test
/// assertions can pin exact ids instead of matching a pattern.
#[derive(Debug, Default)]
pub struct SequentialSidGenerator {
    next: AtomicU64,
}

impl SequentialSidGenerator {
    pub fn new() -> Self {
        SequentialSidGenerator {
            next: AtomicU64::new(1),
        }
    }
}

impl SidGenerator for SequentialSidGenerator {
    fn generate(&self, prefix: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{}_{:04}", prefix, n)
    }
}

/// Token generator that returns a fixed plain token and its real SHA-256
/// hash, so `verify_token` still behaves correctly in tests.
#[derive(Debug, Clone)]
pub struct StubTokenGenerator {
    plain_token: String,
}

impl StubTokenGenerator {
    pub fn new(plain_token: impl Into<String>) -> Self {
        StubTokenGenerator {
            plain_token: plain_token.into(),
        }
    }
}

impl Default for StubTokenGenerator {
    fn default() -> Self {
        StubTokenGenerator::new("stub_token")
    }
}

impl TokenGenerator for StubTokenGenerator {
    fn generate_api_token(&self, prefix: &str) -> (String, String) {
        let plain = format!("{}_{}", prefix, self.plain_token);
        let hash = self.hash_token(&plain);
        (plain, hash)
    }

    fn hash_token(&self, plain_token: &str) -> String {
        super::token::Sha256TokenGenerator.hash_token(plain_token)
    }
}

#[cfg(feature = "repository")]
mod in_memory {
    use super::*;
    use crate::forward::agent::ForwardAgent;
    use crate::forward::repository::{
        ForwardAgentFilter, ForwardAgentRepository, ForwardRuleFilter, ForwardRuleRepository,
    };
    use crate::forward::rule::ForwardRule;
    use crate::repository::{RepositoryError, RepositoryResult};

    /// In-memory [`ForwardAgentRepository`] double backed by a `Mutex<Vec<_>>`.
    #[derive(Default)]
    pub struct InMemoryForwardAgentRepository {
        agents: Mutex<Vec<ForwardAgent>>,
        next_id: AtomicU64,
    }

    impl InMemoryForwardAgentRepository {
        pub fn new() -> Self {
            InMemoryForwardAgentRepository {
                agents: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }
        }
    }

    impl ForwardAgentRepository for InMemoryForwardAgentRepository {
        async fn find_by_id(&self, id: u64) -> RepositoryResult<Option<ForwardAgent>> {
            Ok(self.agents.lock().unwrap().iter().find(|a| a.id() == id).cloned())
        }

        async fn find_by_sid(&self, sid: &str) -> RepositoryResult<Option<ForwardAgent>> {
            Ok(self.agents.lock().unwrap().iter().find(|a| a.sid() == sid).cloned())
        }

        async fn find_by_token_hash(&self, token_hash: &str) -> RepositoryResult<Option<ForwardAgent>> {
            Ok(self
                .agents
                .lock()
                .unwrap()
                .iter()
                .find(|a| a.token_hash() == token_hash)
                .cloned())
        }

        async fn list(&self, filter: &ForwardAgentFilter) -> RepositoryResult<(Vec<ForwardAgent>, u64)> {
            let agents = self.agents.lock().unwrap();
            let matching: Vec<ForwardAgent> = agents
                .iter()
                .filter(|a| {
                    filter
                        .name_contains
                        .as_ref()
                        .is_none_or(|needle| a.name().contains(needle.as_str()))
                        && filter.status.is_none_or(|s| a.status() == s)
                        && filter.group_id.is_none_or(|g| a.group_id() == Some(g))
                })
                .cloned()
                .collect();
            let total = matching.len() as u64;
            Ok((matching, total))
        }

        async fn exists_by_name(&self, name: &str) -> RepositoryResult<bool> {
            Ok(self.agents.lock().unwrap().iter().any(|a| a.name() == name))
        }

        async fn create(&self, mut agent: ForwardAgent) -> RepositoryResult<ForwardAgent> {
            if agent.id() == 0 {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                agent
                    .set_id(id)
                    .map_err(|e| RepositoryError::validation_failed(e.to_string()))?;
            }
            self.agents.lock().unwrap().push(agent.clone());
            Ok(agent)
        }

        async fn update(&self, agent: ForwardAgent) -> RepositoryResult<ForwardAgent> {
            let mut agents = self.agents.lock().unwrap();
            let slot = agents
                .iter_mut()
                .find(|a| a.id() == agent.id())
                .ok_or_else(|| RepositoryError::not_found("ForwardAgent", agent.id().to_string()))?;
            *slot = agent.clone();
            Ok(agent)
        }

        async fn delete(&self, id: u64) -> RepositoryResult<bool> {
            let mut agents = self.agents.lock().unwrap();
            let before = agents.len();
            agents.retain(|a| a.id() != id);
            Ok(agents.len() != before)
        }

        async fn update_last_seen(&self, _id: u64) -> RepositoryResult<()> {
            Ok(())
        }
    }

    /// In-memory [`ForwardRuleRepository`] double backed by a `Mutex<Vec<_>>`.
    #[derive(Default)]
    pub struct InMemoryForwardRuleRepository {
        rules: Mutex<Vec<ForwardRule>>,
        next_id: AtomicU64,
    }

    impl InMemoryForwardRuleRepository {
        pub fn new() -> Self {
            InMemoryForwardRuleRepository {
                rules: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }
        }
    }

    impl ForwardRuleRepository for InMemoryForwardRuleRepository {
        async fn find_by_id(&self, id: u64) -> RepositoryResult<Option<ForwardRule>> {
            Ok(self.rules.lock().unwrap().iter().find(|r| r.id() == id).cloned())
        }

        async fn find_by_sid(&self, sid: &str) -> RepositoryResult<Option<ForwardRule>> {
            Ok(self.rules.lock().unwrap().iter().find(|r| r.sid() == sid).cloned())
        }

        async fn find_by_listen_port(&self, listen_port: u16) -> RepositoryResult<Option<ForwardRule>> {
            Ok(self
                .rules
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.listen_port() == listen_port)
                .cloned())
        }

        async fn find_by_agent_id(&self, agent_id: u64) -> RepositoryResult<Vec<ForwardRule>> {
            Ok(self
                .rules
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.agent_id() == agent_id)
                .cloned()
                .collect())
        }

        async fn find_by_exit_agent_id(&self, exit_agent_id: u64) -> RepositoryResult<Vec<ForwardRule>> {
            Ok(self
                .rules
                .lock()
                .unwrap()
                .iter()
                .filter(|r| {
                    r.exit_agent_id() == exit_agent_id
                        || r.exit_agents().iter().any(|w| w.agent_id == exit_agent_id)
                })
                .cloned()
                .collect())
        }

        async fn find_enabled_by_chain_participant(&self, agent_id: u64) -> RepositoryResult<Vec<ForwardRule>> {
            Ok(self
                .rules
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.status().is_enabled() && r.chain_position(agent_id) >= 0)
                .cloned()
                .collect())
        }

        async fn list(&self, filter: &ForwardRuleFilter) -> RepositoryResult<(Vec<ForwardRule>, u64)> {
            let rules = self.rules.lock().unwrap();
            let matching: Vec<ForwardRule> = rules
                .iter()
                .filter(|r| {
                    filter.status.is_none_or(|s| r.status() == s)
                        && filter.protocol.is_none_or(|p| r.protocol() == p)
                        && filter.rule_type.is_none_or(|t| r.rule_type() == t)
                })
                .cloned()
                .collect();
            let total = matching.len() as u64;
            Ok((matching, total))
        }

        async fn list_by_user_id(
            &self,
            user_id: u64,
            filter: &ForwardRuleFilter,
        ) -> RepositoryResult<(Vec<ForwardRule>, u64)> {
            let (all, _) = self.list(filter).await?;
            let scoped: Vec<ForwardRule> = all.into_iter().filter(|r| r.user_id() == Some(user_id)).collect();
            let total = scoped.len() as u64;
            Ok((scoped, total))
        }

        async fn count_by_user_id(&self, user_id: u64) -> RepositoryResult<u64> {
            Ok(self
                .rules
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.user_id() == Some(user_id))
                .count() as u64)
        }

        async fn total_traffic_by_user_id(&self, user_id: u64) -> RepositoryResult<(i64, i64)> {
            let rules = self.rules.lock().unwrap();
            let (up, down) = rules
                .iter()
                .filter(|r| r.user_id() == Some(user_id))
                .fold((0i64, 0i64), |(up, down), r| {
                    (up + r.raw_upload_bytes(), down + r.raw_download_bytes())
                });
            Ok((up, down))
        }

        async fn exists_by_listen_port(&self, listen_port: u16) -> RepositoryResult<bool> {
            Ok(self
                .rules
                .lock()
                .unwrap()
                .iter()
                .any(|r| r.listen_port() == listen_port))
        }

        async fn create(&self, mut rule: ForwardRule) -> RepositoryResult<ForwardRule> {
            if rule.id() == 0 {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                rule.set_id(id).map_err(|e| RepositoryError::validation_failed(e.to_string()))?;
            }
            self.rules.lock().unwrap().push(rule.clone());
            Ok(rule)
        }

        async fn update(&self, rule: ForwardRule) -> RepositoryResult<ForwardRule> {
            let mut rules = self.rules.lock().unwrap();
            let slot = rules
                .iter_mut()
                .find(|r| r.id() == rule.id())
                .ok_or_else(|| RepositoryError::not_found("ForwardRule", rule.id().to_string()))?;
            *slot = rule.clone();
            Ok(rule)
        }

        async fn delete(&self, id: u64) -> RepositoryResult<bool> {
            let mut rules = self.rules.lock().unwrap();
            let before = rules.len();
            rules.retain(|r| r.id() != id);
            Ok(rules.len() != before)
        }

        async fn update_traffic(&self, id: u64, up: i64, down: i64) -> RepositoryResult<()> {
            let mut rules = self.rules.lock().unwrap();
            if let Some(rule) = rules.iter_mut().find(|r| r.id() == id) {
                rule.record_traffic(up, down, &super::FixedClock::new(rule.updated_at()));
            }
            Ok(())
        }
    }
}

#[cfg(feature = "repository")]
pub use in_memory::{InMemoryForwardAgentRepository, InMemoryForwardRuleRepository};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_reports_fixed_instant() {
        let at = Utc::now();
        let clock = FixedClock::new(at);
        assert_eq!(clock.now(), at);
        assert_eq!(clock.now(), at);
    }

    #[test]
    fn sequential_sid_generator_increments() {
        let gen = SequentialSidGenerator::new();
        assert_eq!(gen.generate("fa"), "fa_0001");
        assert_eq!(gen.generate("fa"), "fa_0002");
    }

    #[test]
    fn stub_token_generator_round_trips() {
        let gen = StubTokenGenerator::new("abc123");
        let (plain, hash) = gen.generate_api_token("fpa");
        assert!(gen.verify_token(&plain, &hash));
    }
}
