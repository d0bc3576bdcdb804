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

//! Defines the hierarchy of error types for the rendering subsystem.
//!
//! Only recoverable conditions are errors. Broken call sequences, device
//! limit violations and pools that stay exhausted after a reclaim pass panic
//! at the point of detection instead.

use super::command::CommandBufferError;
use crate::graph::CycleError;
use super::handles::{BufferId, PipelineHash, RenderTargetId, ShaderProgramId, TextureId};
use thiserror::Error;

/// An error related to the creation or lookup of a GPU resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// A bounded pool has no free element left.
    #[error("{pool} pool exhausted (capacity {capacity})")]
    PoolExhausted {
        /// The pool's name.
        pool: &'static str,
        /// Its fixed capacity.
        capacity: usize,
    },
    /// The buffer is not known to the backend.
    #[error("unknown buffer {0:?}")]
    UnknownBuffer(BufferId),
    /// The texture is not known to the backend.
    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureId),
    /// The render target is not known to the backend.
    #[error("unknown render target {0:?}")]
    UnknownRenderTarget(RenderTargetId),
    /// A descriptor is invalid for this backend.
    #[error("invalid descriptor for '{label}': {reason}")]
    InvalidDescriptor {
        /// The resource's debug name.
        label: String,
        /// What is wrong.
        reason: String,
    },
}

/// An error related to binding a pipeline or its program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// No pipeline is registered under the hash.
    #[error("no pipeline registered under {0:?}")]
    UnknownPipeline(PipelineHash),
    /// The program is still being compiled or linked.
    #[error("shader program {0:?} is not ready")]
    ProgramNotReady(ShaderProgramId),
    /// The program failed to compile or link.
    #[error("shader program {program:?} failed to build: {log}")]
    ProgramFailed {
        /// The program.
        program: ShaderProgramId,
        /// The compiler or linker log.
        log: String,
    },
}

/// A high-level error from the rendering system.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A command buffer failed validation.
    #[error("invalid command buffer")]
    InvalidCommandBuffer(#[from] CommandBufferError),
    /// A resource operation failed.
    #[error("resource error")]
    Resource(#[from] ResourceError),
    /// A pipeline operation failed.
    #[error("pipeline error")]
    Pipeline(#[from] PipelineError),
    /// The render pass graph has a dependency cycle.
    #[error("render pass graph cannot be ordered")]
    PassGraph(#[from] CycleError),
    /// The render thread is gone.
    #[error("render thread disconnected")]
    RenderThreadDisconnected,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_pool_exhausted_display() {
        let err = ResourceError::PoolExhausted {
            pool: "command buffer",
            capacity: 4,
        };
        assert_eq!(err.to_string(), "command buffer pool exhausted (capacity 4)");
    }

    #[test]
    fn test_render_error_keeps_source() {
        let err: RenderError = CommandBufferError::UnterminatedRenderPass.into();
        assert_eq!(err.to_string(), "invalid command buffer");
        let source = err.source().map(|s| s.to_string());
        assert_eq!(
            source.as_deref(),
            Some("render pass left open at the end of the buffer")
        );
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::ProgramNotReady(ShaderProgramId(7));
        assert_eq!(err.to_string(), "shader program ShaderProgramId(7) is not ready");
    }
}
