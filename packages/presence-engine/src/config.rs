//! Engine configuration. File/CLI-based loading is out of scope (spec §1);
//! this struct is the ambient plumbing a future CLI would populate,
//! following the teacher's `ServerConfig`-with-`Default` shape.

/// Tunables for a [`crate::engine::PresenceEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on `expires_s` accepted by `Put`/`Update`, in seconds.
    pub max_expires_s: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_expires_s: presence_core::MAX_EXPIRES,
        }
    }
}
