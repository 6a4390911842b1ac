//! Contest data port: the read-only contract against the external match
//! provider. Adapters own all transport and format concerns; the core sees
//! only canonical types.

pub mod riot;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ActiveMatch, ParticipantResult, ProviderIdentity};

pub use riot::RiotProvider;

#[async_trait]
pub trait ContestProvider: Send + Sync {
    /// Resolve a display identity ("name" + "tag") to the opaque participant
    /// id used by every other call. `NotFound` if no such profile exists.
    async fn resolve_identity(&self, game_name: &str, tag_line: &str)
        -> Result<ProviderIdentity>;

    /// The participant's current live match, if any. `None` is a normal
    /// outcome (not playing), never an error.
    async fn active_match(&self, puuid: &str) -> Result<Option<ActiveMatch>>;

    /// Per-participant outcome of a finished match. `None` means the provider
    /// has not published the result yet; callers retry later.
    async fn match_result(&self, external_id: &str, puuid: &str)
        -> Result<Option<ParticipantResult>>;
}
