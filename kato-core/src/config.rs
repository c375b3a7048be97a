//! Per-session configuration resolution.
//!
//! A session's effective configuration is resolved once at `create_session`
//! time from three layers, lowest to highest precedence: compiled-in
//! defaults, process environment variables (`KATO_*`), and explicit
//! overrides passed to the call. `update_config` re-resolves the same way
//! against the session's current config instead of the defaults.

use crate::error::{KatoError, Result};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "KATO_";
pub const ENV_MAX_PATTERN_LENGTH: &str = "KATO_MAX_PATTERN_LENGTH";
pub const ENV_RECALL_THRESHOLD: &str = "KATO_RECALL_THRESHOLD";
pub const ENV_MAX_PREDICTIONS: &str = "KATO_MAX_PREDICTIONS";
pub const ENV_SESSION_TTL_SECS: &str = "KATO_SESSION_TTL_SECS";
pub const ENV_STM_CAPACITY: &str = "KATO_STM_CAPACITY";

/// A single stage of the filter pipeline, named so configuration can
/// validate pipeline entries at session-creation time instead of discovering
/// a typo mid-predict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Length,
    Jaccard,
    Minhash,
    Rapidfuzz,
}

impl std::str::FromStr for FilterKind {
    type Err = KatoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "length" => Ok(Self::Length),
            "jaccard" => Ok(Self::Jaccard),
            "minhash" => Ok(Self::Minhash),
            "rapidfuzz" => Ok(Self::Rapidfuzz),
            other => Err(KatoError::validation(format!(
                "unknown filter pipeline stage '{other}'; expected one of: length, jaccard, minhash, rapidfuzz"
            ))),
        }
    }
}

/// Effective, resolved configuration for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Partition key. Required; there is no sensible default.
    pub kb_id: String,

    /// If > 0, auto-learn fires once STM reaches this many events.
    /// 0 means learning is explicit only.
    pub max_pattern_length: usize,

    /// Minimum similarity for a prediction to survive the recall gate.
    pub recall_threshold: f64,

    /// Top-K cap on the ranked prediction list.
    pub max_predictions: usize,

    /// Ordered filter pipeline. Empty means no pre-filtering: every pattern
    /// row in the partition is a candidate.
    pub filter_pipeline: Vec<FilterKind>,

    /// Integer tolerance for the `length` filter.
    pub length_max_deviation: i64,

    /// Minimum Jaccard similarity for the `jaccard` filter.
    pub jaccard_min_similarity: f64,

    /// Minimum estimated Jaccard (from MinHash signature intersection) for
    /// the `minhash` filter.
    pub minhash_jaccard_threshold: f64,

    /// Minimum RapidFuzz-style ratio, 0-100, for the `rapidfuzz` filter.
    pub rapidfuzz_min_score: f64,

    /// `true` (default): tokens are atomic units for LCS alignment.
    /// `false`: legacy character-mode alignment.
    pub use_token_matching: bool,

    /// Whether a session's TTL is pushed forward on every access.
    pub auto_extend_session: bool,

    /// Session TTL, in seconds, from creation or last extension.
    pub session_ttl_secs: i64,

    /// Bound on STM length; oldest events are evicted past this.
    pub stm_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            kb_id: "default".to_string(),
            max_pattern_length: 0,
            recall_threshold: 0.1,
            max_predictions: 100,
            filter_pipeline: Vec::new(),
            length_max_deviation: 2,
            jaccard_min_similarity: 0.1,
            minhash_jaccard_threshold: 0.1,
            rapidfuzz_min_score: 10.0,
            use_token_matching: true,
            auto_extend_session: false,
            session_ttl_secs: 3600,
            stm_capacity: 1000,
        }
    }
}

impl SessionConfig {
    /// Resolve defaults overlaid with environment variables.
    pub fn from_env_defaults() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var(ENV_MAX_PATTERN_LENGTH) {
            if let Ok(n) = v.parse() {
                self.max_pattern_length = n;
            }
        }
        if let Ok(v) = std::env::var(ENV_RECALL_THRESHOLD) {
            if let Ok(n) = v.parse() {
                self.recall_threshold = n;
            }
        }
        if let Ok(v) = std::env::var(ENV_MAX_PREDICTIONS) {
            if let Ok(n) = v.parse() {
                self.max_predictions = n;
            }
        }
        if let Ok(v) = std::env::var(ENV_SESSION_TTL_SECS) {
            if let Ok(n) = v.parse() {
                self.session_ttl_secs = n;
            }
        }
        if let Ok(v) = std::env::var(ENV_STM_CAPACITY) {
            if let Ok(n) = v.parse() {
                self.stm_capacity = n;
            }
        }
    }

    /// Apply caller-supplied overrides on top of the current configuration,
    /// validating along the way. Used by both `create_session` (over
    /// `from_env_defaults()`) and `update_config` (over the session's
    /// current config).
    pub fn merge_overrides(mut self, overrides: &SessionConfigOverrides) -> Result<Self> {
        if let Some(kb_id) = &overrides.kb_id {
            if kb_id.is_empty() {
                return Err(KatoError::validation("kb_id must not be empty"));
            }
            self.kb_id = kb_id.clone();
        }
        if let Some(v) = overrides.max_pattern_length {
            self.max_pattern_length = v;
        }
        if let Some(v) = overrides.recall_threshold {
            if !(0.0..=1.0).contains(&v) {
                return Err(KatoError::validation("recall_threshold must be in [0, 1]"));
            }
            self.recall_threshold = v;
        }
        if let Some(v) = overrides.max_predictions {
            self.max_predictions = v;
        }
        if let Some(pipeline) = &overrides.filter_pipeline {
            self.filter_pipeline = pipeline.clone();
        }
        if let Some(v) = overrides.length_max_deviation {
            self.length_max_deviation = v;
        }
        if let Some(v) = overrides.jaccard_min_similarity {
            self.jaccard_min_similarity = v;
        }
        if let Some(v) = overrides.minhash_jaccard_threshold {
            self.minhash_jaccard_threshold = v;
        }
        if let Some(v) = overrides.rapidfuzz_min_score {
            self.rapidfuzz_min_score = v;
        }
        if let Some(v) = overrides.use_token_matching {
            self.use_token_matching = v;
        }
        if let Some(v) = overrides.auto_extend_session {
            self.auto_extend_session = v;
        }
        if let Some(v) = overrides.session_ttl_secs {
            if v <= 0 {
                return Err(KatoError::validation("session_ttl_secs must be positive"));
            }
            self.session_ttl_secs = v;
        }
        if let Some(v) = overrides.stm_capacity {
            if v == 0 {
                return Err(KatoError::validation("stm_capacity must be positive"));
            }
            self.stm_capacity = v;
        }
        Ok(self)
    }
}

/// Sparse overrides supplied to `create_session`/`update_config`. `None`
/// means "leave as-is".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfigOverrides {
    pub kb_id: Option<String>,
    pub max_pattern_length: Option<usize>,
    pub recall_threshold: Option<f64>,
    pub max_predictions: Option<usize>,
    pub filter_pipeline: Option<Vec<FilterKind>>,
    pub length_max_deviation: Option<i64>,
    pub jaccard_min_similarity: Option<f64>,
    pub minhash_jaccard_threshold: Option<f64>,
    pub rapidfuzz_min_score: Option<f64>,
    pub use_token_matching: Option<bool>,
    pub auto_extend_session: Option<bool>,
    pub session_ttl_secs: Option<i64>,
    pub stm_capacity: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_token_mode_and_unfiltered() {
        let cfg = SessionConfig::default();
        assert!(cfg.use_token_matching);
        assert!(cfg.filter_pipeline.is_empty());
    }

    #[test]
    fn overrides_reject_bad_recall_threshold() {
        let cfg = SessionConfig::default();
        let overrides = SessionConfigOverrides {
            recall_threshold: Some(1.5),
            ..Default::default()
        };
        assert!(cfg.merge_overrides(&overrides).is_err());
    }

    #[test]
    fn overrides_apply_kb_id() {
        let cfg = SessionConfig::default();
        let overrides = SessionConfigOverrides {
            kb_id: Some("kb-42".to_string()),
            ..Default::default()
        };
        let resolved = cfg.merge_overrides(&overrides).unwrap();
        assert_eq!(resolved.kb_id, "kb-42");
    }

    #[test]
    fn filter_kind_parses_known_names() {
        assert_eq!("length".parse::<FilterKind>().unwrap(), FilterKind::Length);
        assert!("bogus".parse::<FilterKind>().is_err());
    }
}
