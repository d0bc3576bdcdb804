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

use kiln_core::math::{LinearRgba, Rect};
use kiln_core::renderer::command::*;
use kiln_core::renderer::resources::{
    BufferRange, IndexFormat, SamplerDescriptor, SubresourceRange, TextureDescriptor,
    TextureFormat, TextureTarget, VertexLayout,
};
use kiln_core::renderer::state::{PipelineDescriptor, PolygonMode, PrimitiveTopology};
use kiln_core::renderer::{
    BufferId, GenericDrawCommand, PipelineHash, RenderBackend, RenderOptions, RenderSettings,
    RenderTargetId, ShaderProgramId,
};
use kiln_infra::graphics::gl::{
    AttachmentDescriptor, FramebufferTarget, GeometryBinding, GlBackend, GlCall, HeadlessGl,
    ProgramStatus, RenderTargetDescriptor,
};

struct Scene {
    backend: GlBackend<HeadlessGl>,
    program: ShaderProgramId,
    pipeline: PipelineHash,
    target: RenderTargetId,
    mesh: BufferId,
}

fn pipeline_for(program: ShaderProgramId, name: &str) -> PipelineDescriptor {
    PipelineDescriptor {
        name: name.to_string(),
        program,
        state_block: Default::default(),
        blend_states: Vec::new(),
        topology: PrimitiveTopology::Triangles,
    }
}

fn scene() -> Scene {
    let mut backend = GlBackend::new(HeadlessGl::new(), RenderSettings::default(), 640, 480);
    let program = backend.api_mut().create_program(ProgramStatus::Ready);
    let pipeline = backend.register_pipeline(pipeline_for(program, "opaque"));
    let sampler = backend.register_sampler(SamplerDescriptor::default());
    let target = backend.create_render_target(RenderTargetDescriptor {
        name: "target_a".to_string(),
        width: 256,
        height: 256,
        colors: vec![AttachmentDescriptor {
            format: TextureFormat::Rgba8Unorm,
            sampler,
        }],
        ..Default::default()
    });
    let mesh = backend.create_buffer(1024);
    let indices = backend.create_buffer(256);
    backend.register_geometry(
        mesh,
        GeometryBinding {
            vertex_layout: VertexLayout::default(),
            index_buffer: Some((indices, IndexFormat::U32)),
            indirect_buffer: None,
        },
    );
    Scene {
        backend,
        program,
        pipeline,
        target,
        mesh,
    }
}

fn begin(scene: &mut Scene) {
    scene.backend.begin_frame();
    scene.backend.api_mut().clear_calls();
}

fn draw_list(draws: Vec<GenericDrawCommand>) -> DrawCommandsCommand {
    DrawCommandsCommand { draws }
}

#[test]
fn test_red_cube_pass_issues_one_call_of_each_kind() {
    // --- 1. ARRANGE ---
    let mut scene = scene();
    let mut constants = PushConstants::default();
    constants.set("colour", UniformValue::Color(LinearRgba::RED));

    let mut buffer = CommandBuffer::new();
    buffer.add(BeginRenderPassCommand {
        target: scene.target,
        name: "".into(),
        ..Default::default()
    });
    buffer.add(BindPipelineCommand {
        pipeline: scene.pipeline,
        program: scene.program,
    });
    buffer.add(SendPushConstantsCommand { constants });
    buffer.add(draw_list(vec![GenericDrawCommand::indexed(scene.mesh, 0, 36)]));
    buffer.add(EndRenderPassCommand::default());
    begin(&mut scene);

    // --- 2. ACT ---
    scene.backend.flush_command_buffer(&buffer);

    // --- 3. ASSERT ---
    let api = scene.backend.api();
    assert_eq!(
        api.count(|c| matches!(c, GlCall::BindFramebuffer(FramebufferTarget::Draw, _))),
        1
    );
    assert_eq!(api.count(|c| matches!(c, GlCall::UseProgram(_))), 1);
    assert_eq!(api.count(|c| matches!(c, GlCall::SetUniform(..))), 1);
    assert_eq!(
        api.count(|c| matches!(c, GlCall::DrawElements { count: 36, .. })),
        1
    );
    assert_eq!(api.count(|c| matches!(c, GlCall::DrawArrays { .. })), 0);
    assert_eq!(scene.backend.context().tracker().active_render_target(), None);
    assert!(!scene.backend.context().in_render_pass());

    let stats = scene.backend.frame_stats();
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.commands_flushed, 5);
    assert_eq!(stats.commands_skipped, 0);
}

#[test]
fn test_commands_execute_in_recorded_order() {
    // --- 1. ARRANGE ---
    let mut scene = scene();
    let first = Rect::new(0, 0, 10, 10);
    let second = Rect::new(5, 5, 20, 20);
    let range = BufferRange::new(0, 64);

    let mut buffer = CommandBuffer::new();
    buffer.add(AddDebugMessageCommand {
        message: "a".into(),
        id: 1,
    });
    buffer.add(SetViewportCommand { viewport: first });
    buffer.add(AddDebugMessageCommand {
        message: "b".into(),
        id: 2,
    });
    buffer.add(SetScissorCommand { scissor: second });
    buffer.add(ClearBufferDataCommand {
        buffer: scene.mesh,
        range,
        value: 7,
    });
    begin(&mut scene);

    // --- 2. ACT ---
    scene.backend.flush_command_buffer(&buffer);

    // --- 3. ASSERT ---
    assert_eq!(
        scene.backend.api().calls(),
        &[
            GlCall::DebugMessage(1, "a".to_string()),
            GlCall::Viewport(first),
            GlCall::DebugMessage(2, "b".to_string()),
            GlCall::Scissor(second),
            GlCall::ClearBufferData(scene.mesh, range, 7),
        ]
    );
}

#[test]
#[should_panic(expected = "BEGIN_RENDER_PASS while a render pass is already active")]
fn test_nested_render_pass_panics() {
    let mut scene = scene();
    let mut buffer = CommandBuffer::new();
    buffer.add(BeginRenderPassCommand::default());
    buffer.add(BeginRenderPassCommand {
        target: scene.target,
        ..Default::default()
    });
    begin(&mut scene);

    scene.backend.flush_command_buffer(&buffer);
}

#[test]
#[should_panic(expected = "END_RENDER_PASS without an active render pass")]
fn test_end_without_begin_panics() {
    let mut scene = scene();
    let mut buffer = CommandBuffer::new();
    buffer.add(EndRenderPassCommand::default());
    begin(&mut scene);

    scene.backend.flush_command_buffer(&buffer);
}

#[test]
fn test_compiling_shader_skips_its_pipeline_and_draws() {
    // --- 1. ARRANGE ---
    let mut scene = scene();
    let pending = scene
        .backend
        .api_mut()
        .create_program(ProgramStatus::Compiling);
    let late = scene.backend.register_pipeline(pipeline_for(pending, "late"));
    let mut constants = PushConstants::default();
    constants.set("colour", UniformValue::Color(LinearRgba::GREEN));

    let mut buffer = CommandBuffer::new();
    buffer.add(BeginRenderPassCommand {
        target: scene.target,
        ..Default::default()
    });
    buffer.add(BindPipelineCommand {
        pipeline: late,
        program: ShaderProgramId(0),
    });
    buffer.add(SendPushConstantsCommand {
        constants: constants.clone(),
    });
    buffer.add(draw_list(vec![GenericDrawCommand::indexed(scene.mesh, 0, 3)]));
    buffer.add(BindPipelineCommand {
        pipeline: scene.pipeline,
        program: scene.program,
    });
    buffer.add(draw_list(vec![GenericDrawCommand::indexed(scene.mesh, 3, 3)]));
    buffer.add(EndRenderPassCommand::default());
    begin(&mut scene);

    // --- 2. ACT ---
    scene.backend.flush_command_buffer(&buffer);
    scene.backend.flush_command_buffer(&buffer);

    // --- 3. ASSERT ---
    let api = scene.backend.api();
    assert_eq!(api.count(|c| *c == GlCall::UseProgram(pending)), 0);
    assert_eq!(api.count(|c| matches!(c, GlCall::SetUniform(..))), 0);
    assert_eq!(
        api.count(|c| matches!(c, GlCall::DrawElements { first_index: 0, .. })),
        0
    );
    assert_eq!(
        api.count(|c| matches!(c, GlCall::DrawElements { first_index: 3, .. })),
        2
    );
    let stats = scene.backend.frame_stats();
    assert_eq!(stats.commands_skipped, 6);
    assert_eq!(stats.draw_calls, 2);
}

#[test]
fn test_shader_becomes_ready_on_a_later_frame() {
    let mut scene = scene();
    let program = scene
        .backend
        .api_mut()
        .create_program(ProgramStatus::Compiling);
    let pipeline = scene.backend.register_pipeline(pipeline_for(program, "late"));
    let mut buffer = CommandBuffer::new();
    buffer.add(BindPipelineCommand {
        pipeline,
        program: ShaderProgramId(0),
    });

    begin(&mut scene);
    scene.backend.flush_command_buffer(&buffer);
    let first = scene.backend.end_frame();

    scene
        .backend
        .api_mut()
        .set_program_status(program, ProgramStatus::Ready);
    begin(&mut scene);
    scene.backend.flush_command_buffer(&buffer);
    let second = scene.backend.end_frame();

    assert_eq!(first.commands_skipped, 1);
    assert_eq!(second.commands_skipped, 0);
    assert_eq!(
        scene.backend.api().count(|c| *c == GlCall::UseProgram(program)),
        1
    );
}

#[test]
fn test_push_constants_without_a_pipeline_are_skipped() {
    let mut scene = scene();
    let mut constants = PushConstants::default();
    constants.set("exposure", UniformValue::Float(1.5));
    let mut buffer = CommandBuffer::new();
    buffer.add(SendPushConstantsCommand { constants });
    begin(&mut scene);

    scene.backend.flush_command_buffer(&buffer);

    assert_eq!(scene.backend.frame_stats().commands_skipped, 1);
    assert!(scene.backend.api().calls().is_empty());
}

#[test]
fn test_wireframe_and_geometry_options_submit_twice() {
    // --- 1. ARRANGE ---
    let mut scene = scene();
    let mut draw = GenericDrawCommand::indexed(scene.mesh, 0, 36);
    draw.render_options = RenderOptions::RENDER_GEOMETRY | RenderOptions::RENDER_WIREFRAME;
    let mut buffer = CommandBuffer::new();
    buffer.add(BeginRenderPassCommand {
        target: scene.target,
        ..Default::default()
    });
    buffer.add(BindPipelineCommand {
        pipeline: scene.pipeline,
        program: scene.program,
    });
    buffer.add(draw_list(vec![draw]));
    buffer.add(EndRenderPassCommand::default());
    begin(&mut scene);

    // --- 2. ACT ---
    scene.backend.flush_command_buffer(&buffer);

    // --- 3. ASSERT ---
    let api = scene.backend.api();
    assert_eq!(api.count(|c| matches!(c, GlCall::DrawElements { .. })), 2);
    assert_eq!(
        api.count(|c| *c == GlCall::PolygonMode(PolygonMode::Line)),
        1
    );
    assert_eq!(
        api.calls().last(),
        Some(&GlCall::PolygonMode(PolygonMode::Fill)),
        "the pipeline's fill mode is restored after the wireframe pass"
    );
}

#[test]
fn test_indirect_geometry_uses_multi_draw() {
    let mut scene = scene();
    let commands = scene.backend.create_buffer(4096);
    let mesh = scene.backend.create_buffer(4096);
    scene.backend.register_geometry(
        mesh,
        GeometryBinding {
            vertex_layout: VertexLayout::default(),
            index_buffer: None,
            indirect_buffer: Some(commands),
        },
    );
    let mut draw = GenericDrawCommand::indexed(mesh, 0, 3);
    draw.command_offset = 2;
    draw.draw_count = 4;
    let mut buffer = CommandBuffer::new();
    buffer.add(BindPipelineCommand {
        pipeline: scene.pipeline,
        program: scene.program,
    });
    buffer.add(draw_list(vec![draw]));
    begin(&mut scene);

    scene.backend.flush_command_buffer(&buffer);

    let expected = GlCall::MultiDrawArraysIndirect {
        offset: 2 * kiln_core::renderer::IndirectDrawCommand::STRIDE,
        draw_count: 4,
    };
    assert_eq!(scene.backend.api().count(|c| *c == expected), 1);
}

#[test]
#[should_panic(expected = "exceeds the device work group size")]
fn test_oversized_compute_dispatch_panics() {
    let mut scene = scene();
    let mut buffer = CommandBuffer::new();
    buffer.add(BindPipelineCommand {
        pipeline: scene.pipeline,
        program: scene.program,
    });
    buffer.add(DispatchComputeCommand {
        work_groups: [1, 1, 1],
        local_size: [2048, 1, 1],
    });
    begin(&mut scene);

    scene.backend.flush_command_buffer(&buffer);
}

#[test]
fn test_partial_mip_generation_goes_through_a_recycled_view() {
    // --- 1. ARRANGE ---
    let mut scene = scene();
    let texture = scene
        .backend
        .create_texture(TextureDescriptor {
            name: "atlas".to_string(),
            target: TextureTarget::Texture2DArray,
            width: 512,
            height: 512,
            layers: 4,
            mip_levels: 6,
            ..Default::default()
        })
        .unwrap();
    let layer = SubresourceRange {
        base_layer: 2,
        layer_count: 1,
        ..SubresourceRange::ALL
    };
    let mut buffer = CommandBuffer::new();
    buffer.add(ComputeMipMapsCommand {
        texture,
        range: SubresourceRange::ALL,
    });
    buffer.add(ComputeMipMapsCommand {
        texture,
        range: layer,
    });
    buffer.add(ComputeMipMapsCommand {
        texture,
        range: layer,
    });
    begin(&mut scene);

    // --- 2. ACT ---
    scene.backend.flush_command_buffer(&buffer);

    // --- 3. ASSERT ---
    let api = scene.backend.api();
    assert_eq!(api.count(|c| *c == GlCall::GenerateMipmap(texture)), 1);
    assert_eq!(
        api.count(|c| matches!(c, GlCall::CreateTextureView(..))),
        1,
        "the second sub-range request reuses the cached view"
    );
    assert_eq!(api.count(|c| matches!(c, GlCall::GenerateMipmap(_))), 3);
}

#[test]
fn test_sub_pass_redirects_a_single_layer() {
    // --- 1. ARRANGE ---
    let mut scene = scene();
    let sampler = scene.backend.register_sampler(SamplerDescriptor::default());
    let cascades = scene.backend.create_render_target(RenderTargetDescriptor {
        name: "shadow_cascades".to_string(),
        width: 1024,
        height: 1024,
        target: TextureTarget::Texture2DArray,
        layers: 4,
        depth: Some(AttachmentDescriptor {
            format: TextureFormat::Depth32Float,
            sampler,
        }),
        ..Default::default()
    });
    let mut buffer = CommandBuffer::new();
    buffer.add(BeginRenderPassCommand {
        target: cascades,
        name: "shadows".into(),
        ..Default::default()
    });
    for layer in 0..2 {
        buffer.add(BeginRenderSubPassCommand {
            mip_level: 0,
            write_layers: vec![AttachmentLayer {
                slot: AttachmentSlot::Depth,
                layer,
            }],
        });
        buffer.add(EndRenderSubPassCommand);
    }
    buffer.add(EndRenderPassCommand::default());
    begin(&mut scene);

    // --- 2. ACT ---
    scene.backend.flush_command_buffer(&buffer);

    // --- 3. ASSERT ---
    let api = scene.backend.api();
    let layered: Vec<u16> = api
        .calls()
        .iter()
        .filter_map(|c| match c {
            GlCall::FramebufferAttachment(_, AttachmentSlot::Depth, _, 0, Some(layer)) => {
                Some(*layer)
            }
            _ => None,
        })
        .collect();
    assert_eq!(layered, vec![0, 1]);
    assert_eq!(
        api.count(|c| matches!(c, GlCall::BindFramebuffer(FramebufferTarget::Draw, _))),
        1
    );
    assert_eq!(
        api.count(|c| matches!(c, GlCall::PushDebugGroup(_, name) if name == "shadows")),
        1
    );
    assert_eq!(api.count(|c| matches!(c, GlCall::PopDebugGroup)), 1);
}

#[test]
fn test_restore_default_target_rebinds_the_screen() {
    let mut scene = scene();
    let mut buffer = CommandBuffer::new();
    buffer.add(BeginRenderPassCommand {
        target: scene.target,
        ..Default::default()
    });
    buffer.add(EndRenderPassCommand {
        restore_default_target: true,
    });
    begin(&mut scene);

    scene.backend.flush_command_buffer(&buffer);

    let api = scene.backend.api();
    let binds: Vec<&GlCall> = api
        .calls()
        .iter()
        .filter(|c| matches!(c, GlCall::BindFramebuffer(..)))
        .collect();
    assert_eq!(binds.len(), 2);
    assert_eq!(
        binds[1],
        &GlCall::BindFramebuffer(FramebufferTarget::Draw, kiln_core::renderer::FramebufferId(0))
    );
    assert_eq!(
        api.calls().last(),
        Some(&GlCall::Viewport(Rect::new(0, 0, 640, 480)))
    );
}

#[test]
fn test_gpu_queries_report_by_tag() {
    // --- 1. ARRANGE ---
    let mut scene = scene();
    let mut buffer = CommandBuffer::new();
    buffer.add(BeginRenderPassCommand {
        target: scene.target,
        ..Default::default()
    });
    buffer.add(BindPipelineCommand {
        pipeline: scene.pipeline,
        program: scene.program,
    });
    buffer.add(BeginGpuQueryCommand {
        tag: 42,
        mask: QueryMask::SAMPLES_PASSED | QueryMask::PRIMITIVES_GENERATED,
    });
    buffer.add(draw_list(vec![GenericDrawCommand::indexed(scene.mesh, 0, 36)]));
    buffer.add(EndGpuQueryCommand {
        wait_for_results: false,
    });
    buffer.add(EndRenderPassCommand::default());
    begin(&mut scene);

    // --- 2. ACT ---
    scene.backend.flush_command_buffer(&buffer);
    let stats = scene.backend.end_frame();

    // --- 3. ASSERT ---
    let tagged: Vec<_> = stats.query_results.iter().filter(|r| r.tag == 42).collect();
    assert_eq!(tagged.len(), 2);
    let primitives = tagged
        .iter()
        .find(|r| r.kind == QueryMask::PRIMITIVES_GENERATED.bits())
        .map(|r| r.value);
    assert_eq!(primitives, Some(12));
}

#[test]
#[should_panic(expected = "POP_VIEWPORT with an empty viewport stack")]
fn test_popping_an_empty_viewport_stack_panics() {
    let mut scene = scene();
    let mut buffer = CommandBuffer::new();
    buffer.add(PopViewportCommand);
    begin(&mut scene);

    scene.backend.flush_command_buffer(&buffer);
}

#[test]
fn test_missing_text_renderer_is_skipped() {
    let mut scene = scene();
    let mut buffer = CommandBuffer::new();
    buffer.add(DrawTextCommand {
        batch: TextElementBatch {
            elements: vec![TextElement {
                text: "fps".to_string(),
                position: [4.0, 4.0],
                color: LinearRgba::WHITE,
                font_size: 12.0,
            }],
        },
    });
    begin(&mut scene);

    scene.backend.flush_command_buffer(&buffer);
    scene.backend.flush_command_buffer(&buffer);

    assert_eq!(scene.backend.frame_stats().commands_skipped, 2);
}

fn sub_pass_with_repeated_viewport(scene: &Scene) -> CommandBuffer {
    let viewport = Rect::new(0, 0, 64, 64);
    let mut buffer = CommandBuffer::new();
    buffer.add(BeginRenderPassCommand {
        target: scene.target,
        ..Default::default()
    });
    buffer.add(BindPipelineCommand {
        pipeline: scene.pipeline,
        program: scene.program,
    });
    buffer.add(SetViewportCommand { viewport });
    buffer.add(draw_list(vec![GenericDrawCommand::indexed(scene.mesh, 0, 36)]));
    buffer.add(BeginRenderSubPassCommand {
        mip_level: 0,
        write_layers: Vec::new(),
    });
    buffer.add(SetViewportCommand { viewport });
    buffer.add(draw_list(vec![GenericDrawCommand::indexed(scene.mesh, 36, 36)]));
    buffer.add(EndRenderSubPassCommand);
    buffer.add(EndRenderPassCommand::default());
    buffer
}

fn viewports_at_draws(api: &HeadlessGl) -> Vec<Rect> {
    let mut viewport = None;
    let mut at_draws = Vec::new();
    for call in api.calls() {
        match call {
            GlCall::Viewport(rect) => viewport = Some(*rect),
            GlCall::DrawElements { .. } => at_draws.extend(viewport),
            _ => {}
        }
    }
    at_draws
}

#[test]
fn test_batching_keeps_the_viewport_set_inside_a_sub_pass() {
    // --- 1. ARRANGE ---
    let mut plain = scene();
    let mut batched = scene();
    let unbatched_buffer = sub_pass_with_repeated_viewport(&plain);
    let mut batched_buffer = sub_pass_with_repeated_viewport(&batched);
    batched_buffer.batch();
    begin(&mut plain);
    begin(&mut batched);

    // --- 2. ACT ---
    plain.backend.flush_command_buffer(&unbatched_buffer);
    batched.backend.flush_command_buffer(&batched_buffer);

    // --- 3. ASSERT ---
    let small = Rect::new(0, 0, 64, 64);
    assert_eq!(viewports_at_draws(plain.backend.api()), vec![small, small]);
    assert_eq!(batched_buffer.len(), unbatched_buffer.len());
    assert_eq!(plain.backend.api().calls(), batched.backend.api().calls());
}

#[test]
fn test_pass_without_depth_in_its_draw_mask_keeps_depth_writes_off() {
    // --- 1. ARRANGE ---
    let mut scene = scene();
    let mut buffer = CommandBuffer::new();
    buffer.add(BeginRenderPassCommand {
        target: scene.target,
        draw_mask: DrawMask {
            colors: 1,
            depth: false,
        },
        ..Default::default()
    });
    buffer.add(BindPipelineCommand {
        pipeline: scene.pipeline,
        program: scene.program,
    });
    buffer.add(draw_list(vec![GenericDrawCommand::indexed(scene.mesh, 0, 36)]));
    buffer.add(EndRenderPassCommand::default());
    begin(&mut scene);

    // --- 2. ACT ---
    scene.backend.flush_command_buffer(&buffer);

    // --- 3. ASSERT ---
    let calls = scene.backend.api().calls();
    let draw = calls
        .iter()
        .position(|c| matches!(c, GlCall::DrawElements { .. }))
        .unwrap();
    let depth_mask_at_draw = calls[..draw]
        .iter()
        .rev()
        .find_map(|c| match c {
            GlCall::DepthMask(write) => Some(*write),
            _ => None,
        });
    assert_eq!(depth_mask_at_draw, Some(false));
    assert_eq!(
        calls[draw..].iter().rev().find_map(|c| match c {
            GlCall::DepthMask(write) => Some(*write),
            _ => None,
        }),
        Some(true),
        "depth writes come back once the pass ends"
    );
    assert!(!scene.backend.context().tracker().depth_writes_masked());
}

#[test]
#[should_panic(expected = "BEGIN_RENDER_SUB_PASS while a sub-pass is already active")]
fn test_nested_sub_pass_panics() {
    let mut scene = scene();
    let mut buffer = CommandBuffer::new();
    buffer.add(BeginRenderPassCommand {
        target: scene.target,
        ..Default::default()
    });
    buffer.add(BeginRenderSubPassCommand::default());
    buffer.add(BeginRenderSubPassCommand::default());
    begin(&mut scene);

    scene.backend.flush_command_buffer(&buffer);
}
