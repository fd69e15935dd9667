//! Persistence contracts for the forward aggregates
//!
//! These traits use RPITIT (Return Position Impl Trait In Traits) the same
//! way [`crate::repository::Repository`] does. They are deliberately not
//! expressed in terms of the generic `Repository` trait: the lookups an
//! agent fleet needs (by token hash, by listen port, by chain participation)
//! are specific enough that a generic filter vocabulary would only obscure
//! them.

use std::future::Future;

use super::agent::ForwardAgent;
use super::rule::ForwardRule;
use crate::repository::{OrderDirection, Pagination, RepositoryResult};

/// Substring/equality filters for listing agents, plus ordering and paging.
#[derive(Debug, Clone, Default)]
pub struct ForwardAgentFilter {
    pub name_contains: Option<String>,
    pub status: Option<super::value_objects::ForwardStatus>,
    pub group_id: Option<u64>,
    pub order_by: Option<(String, OrderDirection)>,
    pub pagination: Option<Pagination>,
}

/// Substring/equality filters for listing rules, plus ordering and paging.
#[derive(Debug, Clone, Default)]
pub struct ForwardRuleFilter {
    pub name_contains: Option<String>,
    pub status: Option<super::value_objects::ForwardStatus>,
    pub protocol: Option<super::value_objects::ForwardProtocol>,
    pub rule_type: Option<super::value_objects::ForwardRuleType>,
    pub order_by: Option<(String, OrderDirection)>,
    pub pagination: Option<Pagination>,
}

/// Storage contract for [`ForwardAgent`].
pub trait ForwardAgentRepository: Send + Sync {
    fn find_by_id(&self, id: u64) -> impl Future<Output = RepositoryResult<Option<ForwardAgent>>> + Send;

    fn find_by_sid(&self, sid: &str) -> impl Future<Output = RepositoryResult<Option<ForwardAgent>>> + Send;

    fn find_by_token_hash(
        &self,
        token_hash: &str,
    ) -> impl Future<Output = RepositoryResult<Option<ForwardAgent>>> + Send;

    fn list(
        &self,
        filter: &ForwardAgentFilter,
    ) -> impl Future<Output = RepositoryResult<(Vec<ForwardAgent>, u64)>> + Send;

    fn exists_by_name(&self, name: &str) -> impl Future<Output = RepositoryResult<bool>> + Send;

    fn create(&self, agent: ForwardAgent) -> impl Future<Output = RepositoryResult<ForwardAgent>> + Send;

    fn update(&self, agent: ForwardAgent) -> impl Future<Output = RepositoryResult<ForwardAgent>> + Send;

    fn delete(&self, id: u64) -> impl Future<Output = RepositoryResult<bool>> + Send;

    /// Hot-path timestamp bump without a full entity round-trip.
    fn update_last_seen(&self, id: u64) -> impl Future<Output = RepositoryResult<()>> + Send;
}

/// Storage contract for [`ForwardRule`].
pub trait ForwardRuleRepository: Send + Sync {
    fn find_by_id(&self, id: u64) -> impl Future<Output = RepositoryResult<Option<ForwardRule>>> + Send;

    fn find_by_sid(&self, sid: &str) -> impl Future<Output = RepositoryResult<Option<ForwardRule>>> + Send;

    fn find_by_listen_port(
        &self,
        listen_port: u16,
    ) -> impl Future<Output = RepositoryResult<Option<ForwardRule>>> + Send;

    fn find_by_agent_id(&self, agent_id: u64) -> impl Future<Output = RepositoryResult<Vec<ForwardRule>>> + Send;

    fn find_by_exit_agent_id(
        &self,
        exit_agent_id: u64,
    ) -> impl Future<Output = RepositoryResult<Vec<ForwardRule>>> + Send;

    /// Enabled-only variant used by the runtime path: rules where
    /// `agent_id` participates anywhere in the hop chain.
    fn find_enabled_by_chain_participant(
        &self,
        agent_id: u64,
    ) -> impl Future<Output = RepositoryResult<Vec<ForwardRule>>> + Send;

    fn list(
        &self,
        filter: &ForwardRuleFilter,
    ) -> impl Future<Output = RepositoryResult<(Vec<ForwardRule>, u64)>> + Send;

    fn list_by_user_id(
        &self,
        user_id: u64,
        filter: &ForwardRuleFilter,
    ) -> impl Future<Output = RepositoryResult<(Vec<ForwardRule>, u64)>> + Send;

    fn count_by_user_id(&self, user_id: u64) -> impl Future<Output = RepositoryResult<u64>> + Send;

    fn total_traffic_by_user_id(
        &self,
        user_id: u64,
    ) -> impl Future<Output = RepositoryResult<(i64, i64)>> + Send;

    fn exists_by_listen_port(&self, listen_port: u16) -> impl Future<Output = RepositoryResult<bool>> + Send;

    fn create(&self, rule: ForwardRule) -> impl Future<Output = RepositoryResult<ForwardRule>> + Send;

    fn update(&self, rule: ForwardRule) -> impl Future<Output = RepositoryResult<ForwardRule>> + Send;

    fn delete(&self, id: u64) -> impl Future<Output = RepositoryResult<bool>> + Send;

    /// Hot-path traffic accumulation without a full entity round-trip.
    fn update_traffic(&self, id: u64, up: i64, down: i64) -> impl Future<Output = RepositoryResult<()>> + Send;
}
