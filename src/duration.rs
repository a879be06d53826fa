// src/duration.rs

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::blob::RawAudioBlob;
use crate::config::StudioConfig;
use crate::decoder;
use crate::error::{DurationError, StrategyFailure};

/// One way of finding out how long a blob plays for.
pub trait DurationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// A finite, positive number of seconds, or why not.
    fn resolve(&self, blob: &RawAudioBlob) -> Result<f64, String>;
}

/// Reads the length the container declares.
pub struct MetadataProbe;

impl DurationStrategy for MetadataProbe {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn resolve(&self, blob: &RawAudioBlob) -> Result<f64, String> {
        decoder::probe_duration(blob).map_err(|e| e.to_string())
    }
}

/// Decodes every packet and counts frames.
pub struct FullDecode;

impl DurationStrategy for FullDecode {
    fn name(&self) -> &'static str {
        "decode"
    }

    fn resolve(&self, blob: &RawAudioBlob) -> Result<f64, String> {
        let pcm = decoder::decode_blob(blob).map_err(|e| e.to_string())?;
        Ok(pcm.duration_secs())
    }
}

/// Byte size over a nominal bitrate. Only trusted inside `(0, max_secs)`.
pub struct SizeEstimate {
    pub bitrate_bps: u32,
    pub max_secs: f64,
}

impl DurationStrategy for SizeEstimate {
    fn name(&self) -> &'static str {
        "size-estimate"
    }

    fn resolve(&self, blob: &RawAudioBlob) -> Result<f64, String> {
        let secs = size_estimate(blob.len(), self.bitrate_bps);
        if secs > 0.0 && secs < self.max_secs {
            Ok(secs)
        } else {
            Err(format!("estimate {secs:.2}s outside (0, {})", self.max_secs))
        }
    }
}

/// `size_bytes * 8 / bitrate`, unchecked. Callers use this directly as the
/// last resort once the resolver itself has given up.
pub fn size_estimate(size_bytes: usize, bitrate_bps: u32) -> f64 {
    if bitrate_bps == 0 {
        return 0.0;
    }
    size_bytes as f64 * 8.0 / bitrate_bps as f64
}

/// Ordered strategy chain. Each strategy runs only if every earlier one
/// failed; the first is additionally bounded by a timeout.
#[derive(Clone)]
pub struct DurationResolver {
    strategies: Vec<Arc<dyn DurationStrategy>>,
    first_timeout: Duration,
}

impl DurationResolver {
    pub fn new(strategies: Vec<Arc<dyn DurationStrategy>>, first_timeout: Duration) -> Self {
        Self {
            strategies,
            first_timeout,
        }
    }

    /// Metadata, then full decode, then size estimate.
    pub fn from_config(config: &StudioConfig) -> Self {
        Self::new(
            vec![
                Arc::new(MetadataProbe),
                Arc::new(FullDecode),
                Arc::new(SizeEstimate {
                    bitrate_bps: config.nominal_bitrate_bps,
                    max_secs: config.max_estimated_duration_secs,
                }),
            ],
            config.metadata_probe_timeout(),
        )
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn resolve(&self, blob: &RawAudioBlob) -> Result<f64, DurationError> {
        let mut failures = Vec::with_capacity(self.strategies.len());

        for (index, strategy) in self.strategies.iter().enumerate() {
            let name = strategy.name();
            let task = {
                let strategy = Arc::clone(strategy);
                let blob = blob.clone();
                tokio::task::spawn_blocking(move || strategy.resolve(&blob))
            };

            let outcome = if index == 0 {
                match tokio::time::timeout(self.first_timeout, task).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!(strategy = name, timeout = ?self.first_timeout, "duration strategy timed out");
                        failures.push(StrategyFailure {
                            strategy: name,
                            reason: format!("timed out after {:?}", self.first_timeout),
                        });
                        continue;
                    }
                }
            } else {
                task.await
            };

            let reason = match outcome {
                Ok(Ok(secs)) if secs.is_finite() && secs > 0.0 => {
                    debug!(strategy = name, secs, "duration resolved");
                    return Ok(secs);
                }
                Ok(Ok(secs)) => format!("unusable duration {secs}"),
                Ok(Err(reason)) => reason,
                Err(join) => format!("strategy task failed: {join}"),
            };
            debug!(strategy = name, %reason, "duration strategy failed");
            failures.push(StrategyFailure {
                strategy: name,
                reason,
            });
        }

        warn!(attempts = failures.len(), "all duration strategies exhausted");
        Err(DurationError::Exhausted(failures))
    }

    /// Never fails: falls back to the raw size estimate when the chain is
    /// exhausted.
    pub async fn resolve_or_estimate(&self, blob: &RawAudioBlob, bitrate_bps: u32) -> f64 {
        match self.resolve(blob).await {
            Ok(secs) => secs,
            Err(e) => {
                let secs = size_estimate(blob.len(), bitrate_bps);
                warn!(error = %e, secs, "using size-based duration estimate");
                secs
            }
        }
    }
}
