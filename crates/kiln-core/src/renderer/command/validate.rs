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

//! Static checks of a recorded command sequence.

use super::{CommandRef, CommandType};
use thiserror::Error;

/// A sequencing error found by [`CommandBuffer::validate`](super::CommandBuffer::validate).
///
/// `position` is the offending command's index in the execution order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandBufferError {
    /// A render pass began while another was active.
    #[error("command {position}: render pass begun while another render pass is active")]
    NestedRenderPass {
        /// Position in the execution order.
        position: usize,
    },
    /// A render pass ended with none active.
    #[error("command {position}: render pass ended with no render pass active")]
    RenderPassNotActive {
        /// Position in the execution order.
        position: usize,
    },
    /// A render pass was still active at the end of the buffer.
    #[error("render pass left open at the end of the buffer")]
    UnterminatedRenderPass,
    /// A sub-pass command appeared outside a render pass, or sub-passes were nested.
    #[error("command {position}: {command:?} is invalid in the current sub-pass state")]
    InvalidSubPass {
        /// Position in the execution order.
        position: usize,
        /// The offending command.
        command: CommandType,
    },
    /// Draws were recorded outside a render pass.
    #[error("command {position}: draw recorded outside a render pass")]
    DrawOutsideRenderPass {
        /// Position in the execution order.
        position: usize,
    },
    /// A debug scope was closed without being opened.
    #[error("command {position}: debug scope closed without a matching open")]
    DebugScopeUnderflow {
        /// Position in the execution order.
        position: usize,
    },
    /// Debug scopes were left open at the end of the buffer.
    #[error("{open} debug scope(s) left open at the end of the buffer")]
    UnbalancedDebugScopes {
        /// Number of scopes still open.
        open: usize,
    },
    /// A viewport was popped from an empty stack.
    #[error("command {position}: viewport popped from an empty stack")]
    ViewportStackUnderflow {
        /// Position in the execution order.
        position: usize,
    },
    /// A draw combined multi-draw with instancing.
    #[error("command {position}: draw {draw} combines multi-draw with instancing")]
    InstancedMultiDraw {
        /// Position in the execution order.
        position: usize,
        /// Index of the draw within the command.
        draw: usize,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum PassState {
    #[default]
    Idle,
    Begun,
    InSubPass,
}

/// Checks consecutive command buffers against the render pass state machine.
///
/// State carries over from one [`check`](Self::check) to the next, so a
/// render pass or debug scope may open in one buffer and close in a later
/// one. Error positions are relative to the buffer being checked.
#[derive(Debug, Default, Clone)]
pub struct CommandValidator {
    pass: PassState,
    debug_depth: usize,
    viewport_depth: usize,
}

impl CommandValidator {
    /// A validator in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` while a render pass is open.
    pub fn in_render_pass(&self) -> bool {
        self.pass != PassState::Idle
    }

    /// Walks `commands` in execution order, stopping at the first error.
    pub fn check<'a>(
        &mut self,
        commands: impl Iterator<Item = CommandRef<'a>>,
    ) -> Result<(), CommandBufferError> {
        use CommandBufferError::*;

        for (position, command) in commands.enumerate() {
            match command {
                CommandRef::BeginRenderPass(_) => {
                    if self.pass != PassState::Idle {
                        return Err(NestedRenderPass { position });
                    }
                    self.pass = PassState::Begun;
                }
                CommandRef::EndRenderPass(_) => {
                    if self.pass == PassState::Idle {
                        return Err(RenderPassNotActive { position });
                    }
                    self.pass = PassState::Idle;
                }
                CommandRef::BeginRenderSubPass(_) => {
                    if self.pass != PassState::Begun {
                        return Err(InvalidSubPass {
                            position,
                            command: CommandType::BeginRenderSubPass,
                        });
                    }
                    self.pass = PassState::InSubPass;
                }
                CommandRef::EndRenderSubPass(_) => {
                    if self.pass != PassState::InSubPass {
                        return Err(InvalidSubPass {
                            position,
                            command: CommandType::EndRenderSubPass,
                        });
                    }
                    self.pass = PassState::Begun;
                }
                CommandRef::DrawCommands(c) => {
                    if self.pass == PassState::Idle {
                        return Err(DrawOutsideRenderPass { position });
                    }
                    if let Some(draw) = c.draws.iter().position(|d| d.is_invalid_multi_draw()) {
                        return Err(InstancedMultiDraw { position, draw });
                    }
                }
                CommandRef::BeginDebugScope(_) => self.debug_depth += 1,
                CommandRef::EndDebugScope(_) => {
                    self.debug_depth = self
                        .debug_depth
                        .checked_sub(1)
                        .ok_or(DebugScopeUnderflow { position })?;
                }
                CommandRef::PushViewport(_) => self.viewport_depth += 1,
                CommandRef::PopViewport(_) => {
                    self.viewport_depth = self
                        .viewport_depth
                        .checked_sub(1)
                        .ok_or(ViewportStackUnderflow { position })?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Reports a render pass or debug scope still open after the last buffer.
    pub fn finish(&self) -> Result<(), CommandBufferError> {
        if self.pass != PassState::Idle {
            return Err(CommandBufferError::UnterminatedRenderPass);
        }
        if self.debug_depth > 0 {
            return Err(CommandBufferError::UnbalancedDebugScopes {
                open: self.debug_depth,
            });
        }
        Ok(())
    }
}

pub(super) fn validate_commands<'a>(
    commands: impl Iterator<Item = CommandRef<'a>>,
) -> Result<(), CommandBufferError> {
    let mut validator = CommandValidator::new();
    validator.check(commands)?;
    validator.finish()
}

#[cfg(test)]
mod tests {
    use super::super::*;
    use super::CommandBufferError;

    #[test]
    fn test_well_formed_pass_validates() {
        let mut buffer = CommandBuffer::new();
        buffer.add(BeginDebugScopeCommand::default());
        buffer.add(BeginRenderPassCommand::default());
        buffer.add(BindPipelineCommand::default());
        buffer.add(SendPushConstantsCommand::default());
        buffer.add(BeginRenderSubPassCommand::default());
        buffer.add(DrawCommandsCommand::default());
        buffer.add(EndRenderSubPassCommand);
        buffer.add(EndRenderPassCommand::default());
        buffer.add(EndDebugScopeCommand);
        assert_eq!(buffer.validate(), Ok(()));
    }

    #[test]
    fn test_nested_pass_is_reported() {
        let mut buffer = CommandBuffer::new();
        buffer.add(BeginRenderPassCommand::default());
        buffer.add(BeginRenderPassCommand::default());
        assert_eq!(
            buffer.validate(),
            Err(CommandBufferError::NestedRenderPass { position: 1 })
        );
    }

    #[test]
    fn test_push_constants_before_a_pipeline_bind_are_left_to_dispatch() {
        let mut buffer = CommandBuffer::new();
        buffer.add(BeginRenderPassCommand::default());
        buffer.add(SendPushConstantsCommand::default());
        buffer.add(DrawCommandsCommand::default());
        buffer.add(EndRenderPassCommand::default());
        assert_eq!(buffer.validate(), Ok(()));
    }

    #[test]
    fn test_nested_sub_pass_is_reported() {
        let mut buffer = CommandBuffer::new();
        buffer.add(BeginRenderPassCommand::default());
        buffer.add(BeginRenderSubPassCommand::default());
        buffer.add(BeginRenderSubPassCommand::default());
        assert_eq!(
            buffer.validate(),
            Err(CommandBufferError::InvalidSubPass {
                position: 2,
                command: CommandType::BeginRenderSubPass,
            })
        );
    }

    #[test]
    fn test_validator_follows_a_pass_across_buffers() {
        let mut opening = CommandBuffer::new();
        opening.add(BeginDebugScopeCommand::default());
        opening.add(BeginRenderPassCommand::default());
        let mut closing = CommandBuffer::new();
        closing.add(DrawCommandsCommand::default());
        closing.add(EndRenderPassCommand::default());
        closing.add(EndDebugScopeCommand);

        let mut validator = CommandValidator::new();
        assert_eq!(validator.check(opening.iter()), Ok(()));
        assert!(validator.in_render_pass());
        assert_eq!(
            validator.finish(),
            Err(CommandBufferError::UnterminatedRenderPass)
        );
        assert_eq!(validator.check(closing.iter()), Ok(()));
        assert_eq!(validator.finish(), Ok(()));
    }

    #[test]
    fn test_scope_and_viewport_underflow() {
        let mut scopes = CommandBuffer::new();
        scopes.add(EndDebugScopeCommand);
        assert_eq!(
            scopes.validate(),
            Err(CommandBufferError::DebugScopeUnderflow { position: 0 })
        );

        let mut viewports = CommandBuffer::new();
        viewports.add(PushViewportCommand::default());
        viewports.add(PopViewportCommand);
        viewports.add(PopViewportCommand);
        assert_eq!(
            viewports.validate(),
            Err(CommandBufferError::ViewportStackUnderflow { position: 2 })
        );
    }

    #[test]
    fn test_draw_outside_pass_and_open_pass() {
        let mut outside = CommandBuffer::new();
        outside.add(DrawCommandsCommand::default());
        assert!(matches!(
            outside.validate(),
            Err(CommandBufferError::DrawOutsideRenderPass { position: 0 })
        ));

        let mut open = CommandBuffer::new();
        open.add(BeginRenderPassCommand::default());
        assert_eq!(
            open.validate(),
            Err(CommandBufferError::UnterminatedRenderPass)
        );
    }
}
