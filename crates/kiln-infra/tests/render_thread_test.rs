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

use kiln_core::graph::RenderPassGraph;
use kiln_core::math::{LinearRgba, Rect};
use kiln_core::renderer::command::{
    AddDebugMessageCommand, BeginRenderPassCommand, BindPipelineCommand, CommandBuffer,
    CommandBufferPool, DrawCommandsCommand, EndRenderPassCommand, PushConstants,
    SendPushConstantsCommand, SetViewportCommand, UniformValue,
};
use kiln_core::renderer::resources::{IndexFormat, VertexLayout};
use kiln_core::renderer::state::{PipelineDescriptor, PrimitiveTopology};
use kiln_core::renderer::{GenericDrawCommand, RenderError, RenderSettings};
use kiln_infra::graphics::gl::{
    GeometryBinding, GlBackend, GlCall, HeadlessGl, ProgramStatus, RenderThread,
};

fn spawn(settings: RenderSettings) -> RenderThread<HeadlessGl> {
    let backend = GlBackend::new(HeadlessGl::new(), settings, 800, 600);
    RenderThread::spawn(backend).unwrap()
}

fn marker(text: &'static str) -> impl FnOnce(&mut CommandBuffer) + Send {
    move |buffer: &mut CommandBuffer| {
        buffer.add(AddDebugMessageCommand {
            message: text.into(),
            id: 0,
        });
    }
}

fn messages(api: &HeadlessGl) -> Vec<&str> {
    api.calls()
        .iter()
        .filter_map(|c| match c {
            GlCall::DebugMessage(_, message) => Some(message.as_str()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_passes_recorded_on_workers_flush_in_dependency_order() {
    // --- 1. ARRANGE ---
    let _ = env_logger::builder().is_test(true).try_init();
    let pool = CommandBufferPool::new(8);
    let thread = spawn(RenderSettings::default());
    let mut graph = RenderPassGraph::new();
    let tonemap = graph.add_pass("tonemap", marker("tonemap"));
    let lighting = graph.add_pass("lighting", marker("lighting"));
    let shadows = graph.add_pass("shadows", marker("shadows"));
    graph.add_dependency(tonemap, lighting);
    graph.add_dependency(lighting, shadows);
    let passes = graph.record(&pool, 3).unwrap();

    // --- 2. ACT ---
    thread
        .submit_frame(passes.into_iter().map(|pass| pass.buffer).collect())
        .unwrap();
    let stats = thread.wait_frame().unwrap();
    let backend = thread.shutdown();

    // --- 3. ASSERT ---
    assert_eq!(stats.frame_index, 0);
    assert_eq!(stats.command_buffers, 3);
    assert_eq!(messages(backend.api()), vec!["shadows", "lighting", "tonemap"]);
    assert_eq!(pool.outstanding(), 0, "flushed buffers return to the pool");
}

#[test]
fn test_sequence_errors_stop_the_render_thread_when_validating() {
    let pool = CommandBufferPool::new(4);
    let thread = spawn(RenderSettings {
        validate_command_buffers: true,
        ..Default::default()
    });
    let mut valid = pool.scoped();
    valid.add(AddDebugMessageCommand {
        message: "ok".into(),
        id: 1,
    });
    let mut broken = pool.scoped();
    broken.add(EndRenderPassCommand::default());
    broken.add(AddDebugMessageCommand {
        message: "never".into(),
        id: 2,
    });

    thread.submit_frame(vec![valid, broken]).unwrap();

    assert!(matches!(
        thread.wait_frame(),
        Err(RenderError::RenderThreadDisconnected)
    ));
}

#[test]
fn test_render_pass_may_span_buffers_when_validating() {
    let pool = CommandBufferPool::new(4);
    let thread = spawn(RenderSettings {
        validate_command_buffers: true,
        ..Default::default()
    });
    let mut opening = pool.scoped();
    opening.add(BeginRenderPassCommand::default());
    let mut closing = pool.scoped();
    closing.add(EndRenderPassCommand::default());

    thread.submit_frame(vec![opening, closing]).unwrap();
    let stats = thread.wait_frame().unwrap();

    assert_eq!(stats.command_buffers, 2);
    assert_eq!(stats.commands_flushed, 2);
}

#[test]
fn test_push_constants_use_a_pipeline_bound_by_an_earlier_buffer() {
    // --- 1. ARRANGE ---
    let mut backend = GlBackend::new(
        HeadlessGl::new(),
        RenderSettings {
            validate_command_buffers: true,
            batch_command_buffers: true,
            ..Default::default()
        },
        800,
        600,
    );
    let program = backend.api_mut().create_program(ProgramStatus::Ready);
    let pipeline = backend.register_pipeline(PipelineDescriptor {
        name: "opaque".to_string(),
        program,
        state_block: Default::default(),
        blend_states: Vec::new(),
        topology: PrimitiveTopology::Triangles,
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
    let thread = RenderThread::spawn(backend).unwrap();

    let pool = CommandBufferPool::new(4);
    let mut setup = pool.scoped();
    setup.add(BindPipelineCommand { pipeline, program });
    let mut pass = pool.scoped();
    let mut constants = PushConstants::default();
    constants.set("colour", UniformValue::Color(LinearRgba::RED));
    pass.add(BeginRenderPassCommand::default());
    pass.add(SendPushConstantsCommand { constants });
    pass.add(DrawCommandsCommand {
        draws: vec![GenericDrawCommand::indexed(mesh, 0, 36)],
    });
    pass.add(EndRenderPassCommand::default());

    // --- 2. ACT ---
    thread.submit_frame(vec![setup, pass]).unwrap();
    let stats = thread.wait_frame().unwrap();

    // --- 3. ASSERT ---
    assert_eq!(stats.command_buffers, 2);
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.commands_skipped, 0);
    let backend = thread.shutdown();
    assert_eq!(backend.api().count(|c| matches!(c, GlCall::SetUniform(..))), 1);
}

#[test]
fn test_batching_is_counted_in_frame_stats() {
    let pool = CommandBufferPool::new(2);
    let thread = spawn(RenderSettings {
        batch_command_buffers: true,
        ..Default::default()
    });
    let viewport = Rect::new(0, 0, 400, 300);
    let mut buffer = pool.scoped();
    buffer.add(SetViewportCommand { viewport });
    buffer.add(SetViewportCommand { viewport });

    thread.submit_frame(vec![buffer]).unwrap();
    let stats = thread.wait_frame().unwrap();

    assert_eq!(stats.commands_merged, 0);
    assert_eq!(stats.commands_removed, 1);
    assert_eq!(stats.commands_flushed, 1);
}

#[test]
fn test_frames_are_answered_in_submission_order() {
    let pool = CommandBufferPool::new(4);
    let thread = spawn(RenderSettings::default());
    for _ in 0..3 {
        thread.submit_frame(vec![pool.scoped()]).unwrap();
    }

    let indices: Vec<u64> = (0..3)
        .map(|_| thread.wait_frame().unwrap().frame_index)
        .collect();

    assert_eq!(indices, vec![0, 1, 2]);
}

#[test]
fn test_a_panicking_frame_disconnects_the_thread() {
    let pool = CommandBufferPool::new(2);
    let thread = spawn(RenderSettings {
        validate_command_buffers: false,
        ..Default::default()
    });
    let mut buffer = pool.scoped();
    buffer.add(BeginRenderPassCommand::default());
    buffer.add(BeginRenderPassCommand::default());

    thread.submit_frame(vec![buffer]).unwrap();

    assert!(matches!(
        thread.wait_frame(),
        Err(RenderError::RenderThreadDisconnected)
    ));
}
