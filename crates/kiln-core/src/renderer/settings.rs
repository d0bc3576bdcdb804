// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tunable settings of the command execution core.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default number of frames the CPU may run ahead of the GPU.
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 3;

/// An error raised while loading or saving [`RenderSettings`].
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("failed to read render settings")]
    Io(#[from] std::io::Error),
    /// The settings text is not valid RON for [`RenderSettings`].
    #[error("failed to parse render settings")]
    Parse(#[from] ron::error::SpannedError),
    /// The settings could not be serialized.
    #[error("failed to serialize render settings")]
    Serialize(#[from] ron::Error),
    /// A value is out of range.
    #[error("invalid render setting `{field}`: {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why it is rejected.
        reason: &'static str,
    },
}

/// Settings consumed by the backend and the command-buffer pool.
///
/// Missing fields in a settings file take their default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Frames the CPU may record ahead of the GPU. Sizes every per-frame ring.
    pub frames_in_flight: usize,
    /// Fixed number of command buffers the pool hands out at once.
    pub command_buffer_pool_capacity: usize,
    /// Largest run of unchanged texture units a multi-bind may span.
    pub texture_bind_gap_threshold: u32,
    /// Frames a sampler, VAO or resident texture handle may stay unused before eviction.
    pub residency_reclaim_delay_frames: u64,
    /// Maximum number of live texture views.
    pub view_cache_capacity: usize,
    /// Frames a released texture view waits before it may be recycled.
    pub view_recycle_delay_frames: u64,
    /// Maximum number of query objects.
    pub query_pool_capacity: usize,
    /// Timeout of one fence wait attempt, in nanoseconds.
    pub fence_wait_timeout_ns: u64,
    /// Check each frame's buffers against the render pass state machine
    /// before dispatch. A sequence error panics before the offending buffer runs.
    pub validate_command_buffers: bool,
    /// Run the batching pass before dispatch.
    pub batch_command_buffers: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            command_buffer_pool_capacity: 64,
            texture_bind_gap_threshold: 2,
            residency_reclaim_delay_frames: 3,
            view_cache_capacity: 128,
            view_recycle_delay_frames: 3,
            query_pool_capacity: 64,
            fence_wait_timeout_ns: 1_000_000,
            validate_command_buffers: cfg!(debug_assertions),
            batch_command_buffers: true,
        }
    }
}

impl RenderSettings {
    /// Parses settings from RON text.
    pub fn from_ron_str(text: &str) -> Result<Self, SettingsError> {
        let settings: RenderSettings = ron::from_str(text)?;
        settings.check()?;
        Ok(settings)
    }

    /// Loads settings from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    /// Serializes the settings as pretty-printed RON.
    pub fn to_ron_string(&self) -> Result<String, SettingsError> {
        let pretty = ron::ser::PrettyConfig::default().indentor("  ".to_string());
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }

    /// Rejects values no backend can run with.
    pub fn check(&self) -> Result<(), SettingsError> {
        let positive = [
            ("frames_in_flight", self.frames_in_flight),
            (
                "command_buffer_pool_capacity",
                self.command_buffer_pool_capacity,
            ),
            ("view_cache_capacity", self.view_cache_capacity),
            ("query_pool_capacity", self.query_pool_capacity),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(SettingsError::Invalid {
                    field,
                    reason: "must be at least 1",
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let settings = RenderSettings::from_ron_str("(frames_in_flight: 2)").unwrap();
        assert_eq!(settings.frames_in_flight, 2);
        assert_eq!(
            settings.texture_bind_gap_threshold,
            RenderSettings::default().texture_bind_gap_threshold
        );
    }

    #[test]
    fn test_ron_round_trip() {
        let settings = RenderSettings {
            residency_reclaim_delay_frames: 7,
            ..Default::default()
        };
        let text = settings.to_ron_string().unwrap();
        assert_eq!(RenderSettings::from_ron_str(&text).unwrap(), settings);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let err = RenderSettings::from_ron_str("(query_pool_capacity: 0)").unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid {
                field: "query_pool_capacity",
                ..
            }
        ));
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        let err = RenderSettings::from_ron_str("(frames_in_flight: \"three\")").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }
}
