//! # forwardplane-core
//!
//! Domain core for the forwardplane port-forwarding control plane.
//!
//! This crate owns the `ForwardAgent` and `ForwardRule` aggregates, their value
//! objects, the single validator that enforces cross-field invariants, and the
//! repository contracts a persistence adapter must satisfy. It does not open a
//! socket, speak HTTP, or touch a database driver directly — see the `forward`
//! module for the domain model and `repository` for the storage-facing traits.
//!
//! ## Example
//!
//! ```rust,no_run
//! use forwardplane_core::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let config = Config::load()?;
//! init_tracing(&config)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod forward;
pub mod ids;
pub mod observability;

#[cfg(feature = "repository")]
pub mod repository;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, ForwardConfig, ServiceConfig};
    pub use crate::error::{Error, Result};
    pub use crate::ids::{RequestId, RequestIdError};

    #[cfg(feature = "observability")]
    pub use crate::observability::init_tracing;

    pub use crate::forward::{
        Clock, DomainError, ForwardAgent, ForwardAuthError, ForwardRule, SidGenerator,
        TokenGenerator, UtcClock,
    };

    #[cfg(feature = "repository")]
    pub use crate::forward::{ForwardAgentRepository, ForwardRuleRepository};

    #[cfg(feature = "repository")]
    pub use crate::repository::{
        FilterCondition, FilterOperator, FilterValue, OrderDirection, Pagination,
        RepositoryError, RepositoryErrorKind, RepositoryOperation,
    };

    #[cfg(feature = "http")]
    pub use axum::response::{IntoResponse, Response};

    pub use serde::{Deserialize, Serialize};

    pub use tracing::{debug, error, info, instrument, trace, warn, Level, Span};

    pub use thiserror::Error as ThisError;
    pub use anyhow::{self, Context as AnyhowContext};

    pub use chrono::{DateTime, Duration as ChronoDuration, Utc};
}
