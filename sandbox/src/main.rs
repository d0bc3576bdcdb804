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

// Kiln sandbox
// Drives a few frames through the headless backend and logs their statistics.

use anyhow::{Context, Result};
use kiln_core::graph::RenderPassGraph;
use kiln_core::math::LinearRgba;
use kiln_core::renderer::command::*;
use kiln_core::renderer::resources::{
    IndexFormat, SamplerDescriptor, TextureFormat, TextureTarget, VertexAttribute, VertexFormat,
    VertexLayout,
};
use kiln_core::renderer::state::{BlendState, PipelineDescriptor, PrimitiveTopology};
use kiln_core::renderer::{
    BufferId, CommandBufferPool, FrameStats, GenericDrawCommand, RenderSettings, RenderTargetId,
    TextRenderer,
};
use kiln_infra::graphics::gl::{
    AttachmentDescriptor, GeometryBinding, GlApi, GlBackend, HeadlessGl, ProgramStatus,
    RenderTargetDescriptor, RenderThread,
};

const FRAMES: u64 = 4;
const WORKERS: usize = 4;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 3],
    color: [f32; 3],
}

/// Logs text batches instead of rasterizing glyphs.
struct LogTextRenderer;

impl TextRenderer for LogTextRenderer {
    fn draw_text(&mut self, batch: &TextElementBatch) {
        for element in &batch.elements {
            log::debug!("text at {:?}: {}", element.position, element.text);
        }
    }
}

/// Everything the passes reference, registered once up front.
#[derive(Debug, Clone, Copy)]
struct Scene {
    opaque: BindPipelineCommand,
    late: BindPipelineCommand,
    shadows: RenderTargetId,
    hdr: RenderTargetId,
    cube: BufferId,
    index_count: u32,
}

fn cube() -> (Vec<Vertex>, Vec<u32>) {
    let vertices = (0..8u32)
        .map(|i| {
            let corner = |bit: u32| if i & bit != 0 { 0.5 } else { -0.5 };
            let position = [corner(1), corner(2), corner(4)];
            Vertex {
                position,
                color: position.map(|p| p + 0.5),
            }
        })
        .collect();
    let faces: [[u32; 4]; 6] = [
        [0, 1, 3, 2],
        [4, 6, 7, 5],
        [0, 4, 5, 1],
        [2, 3, 7, 6],
        [0, 2, 6, 4],
        [1, 5, 7, 3],
    ];
    let indices = faces
        .iter()
        .flat_map(|&[a, b, c, d]| [a, b, c, a, c, d])
        .collect();
    (vertices, indices)
}

fn setup(backend: &mut GlBackend<HeadlessGl>) -> Result<Scene> {
    let ready = backend.api_mut().create_program(ProgramStatus::Ready);
    let compiling = backend.api_mut().create_program(ProgramStatus::Compiling);
    let opaque = backend.register_pipeline(PipelineDescriptor {
        name: "opaque".to_string(),
        program: ready,
        state_block: Default::default(),
        blend_states: vec![BlendState::OPAQUE],
        topology: PrimitiveTopology::Triangles,
    });
    let late = backend.register_pipeline(PipelineDescriptor {
        name: "late_compiling".to_string(),
        program: compiling,
        state_block: Default::default(),
        blend_states: vec![BlendState::ALPHA_BLENDING],
        topology: PrimitiveTopology::Triangles,
    });

    let sampler = backend.register_sampler(SamplerDescriptor::default());
    let shadows = backend.create_render_target(RenderTargetDescriptor {
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
    let hdr = backend.create_render_target(RenderTargetDescriptor {
        name: "hdr".to_string(),
        width: 1280,
        height: 720,
        colors: vec![AttachmentDescriptor {
            format: TextureFormat::Rgba16Float,
            sampler,
        }],
        depth: Some(AttachmentDescriptor {
            format: TextureFormat::Depth24Stencil8,
            sampler,
        }),
        ..Default::default()
    });

    let (vertices, indices) = cube();
    let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
    let index_bytes: &[u8] = bytemuck::cast_slice(&indices);
    let cube = backend.create_buffer(vertex_bytes.len());
    let cube_indices = backend.create_buffer(index_bytes.len());
    backend.api_mut().write_buffer(cube, 0, vertex_bytes);
    backend.api_mut().write_buffer(cube_indices, 0, index_bytes);
    let stride = u32::try_from(std::mem::size_of::<Vertex>()).context("vertex stride")?;
    backend.register_geometry(
        cube,
        GeometryBinding {
            vertex_layout: VertexLayout {
                stride,
                attributes: vec![
                    VertexAttribute {
                        location: 0,
                        format: VertexFormat::Float32x3,
                        offset: 0,
                    },
                    VertexAttribute {
                        location: 1,
                        format: VertexFormat::Float32x3,
                        offset: 12,
                    },
                ],
            },
            index_buffer: Some((cube_indices, IndexFormat::U32)),
            indirect_buffer: None,
        },
    );
    backend.set_text_renderer(Box::new(LogTextRenderer));

    Ok(Scene {
        opaque: BindPipelineCommand {
            pipeline: opaque,
            program: ready,
        },
        late: BindPipelineCommand {
            pipeline: late,
            program: compiling,
        },
        shadows,
        hdr,
        cube,
        index_count: u32::try_from(indices.len()).context("index count")?,
    })
}

fn record_shadows(scene: Scene, buffer: &mut CommandBuffer) {
    buffer.add(BeginRenderPassCommand {
        target: scene.shadows,
        name: "shadows".into(),
        clear: ClearDescriptor {
            depth: Some(1.0),
            ..Default::default()
        },
        draw_mask: DrawMask::default(),
    });
    buffer.add(scene.opaque);
    for layer in 0..4 {
        buffer.add(BeginRenderSubPassCommand {
            mip_level: 0,
            write_layers: vec![AttachmentLayer {
                slot: AttachmentSlot::Depth,
                layer,
            }],
        });
        buffer.add(DrawCommandsCommand {
            draws: vec![GenericDrawCommand::indexed(scene.cube, 0, scene.index_count)],
        });
        buffer.add(EndRenderSubPassCommand);
    }
    buffer.add(EndRenderPassCommand::default());
}

fn record_lighting(scene: Scene, frame: u64, buffer: &mut CommandBuffer) {
    buffer.add(BeginRenderPassCommand {
        target: scene.hdr,
        name: "lighting".into(),
        clear: ClearDescriptor::color_and_depth(LinearRgba::BLACK),
        draw_mask: DrawMask::default(),
    });
    buffer.add(BeginGpuQueryCommand {
        tag: 1,
        mask: QueryMask::PRIMITIVES_GENERATED | QueryMask::SAMPLES_PASSED,
    });
    buffer.add(scene.opaque);
    let mut constants = PushConstants::default();
    constants.set("tint", UniformValue::Color(LinearRgba::WHITE));
    constants.set("time", UniformValue::Float(frame as f32 / 60.0));
    buffer.add(SendPushConstantsCommand { constants });
    // Two halves of the cube; batching folds them into one draw.
    let half = scene.index_count / 2;
    buffer.add(DrawCommandsCommand {
        draws: vec![GenericDrawCommand::indexed(scene.cube, 0, half)],
    });
    buffer.add(DrawCommandsCommand {
        draws: vec![GenericDrawCommand::indexed(
            scene.cube,
            half,
            scene.index_count - half,
        )],
    });
    // Still compiling: skipped once, logged once.
    buffer.add(scene.late);
    buffer.add(DrawCommandsCommand {
        draws: vec![GenericDrawCommand::indexed(scene.cube, 0, scene.index_count)],
    });
    buffer.add(EndGpuQueryCommand {
        wait_for_results: false,
    });
    buffer.add(EndRenderPassCommand::default());
}

fn record_present(scene: Scene, frame: u64, buffer: &mut CommandBuffer) {
    buffer.add(BeginDebugScopeCommand {
        name: "present".into(),
        id: 3,
    });
    buffer.add(BlitRenderTargetCommand {
        source: scene.hdr,
        destination: RenderTargetId::SCREEN,
        color_pairs: vec![(0, 0)],
        blit_depth: false,
    });
    buffer.add(BeginRenderPassCommand {
        target: RenderTargetId::SCREEN,
        name: "overlay".into(),
        clear: ClearDescriptor::default(),
        draw_mask: DrawMask::default(),
    });
    buffer.add(DrawTextCommand {
        batch: TextElementBatch {
            elements: vec![TextElement {
                text: format!("frame {frame}"),
                position: [8.0, 8.0],
                color: LinearRgba::WHITE,
                font_size: 14.0,
            }],
        },
    });
    buffer.add(EndRenderPassCommand {
        restore_default_target: true,
    });
    buffer.add(EndDebugScopeCommand);
}

fn log_frame(stats: &FrameStats) {
    log::info!(
        "frame {}: {} buffers, {} commands ({} skipped, {} merged, {} removed), {} draws, \
         {} state changes ({} elided), {} query results",
        stats.frame_index,
        stats.command_buffers,
        stats.commands_flushed,
        stats.commands_skipped,
        stats.commands_merged,
        stats.commands_removed,
        stats.draw_calls,
        stats.state_changes,
        stats.state_changes_elided,
        stats.query_results.len()
    );
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let settings = match std::env::args().nth(1) {
        Some(path) => RenderSettings::load(&path)
            .with_context(|| format!("loading render settings from {path}"))?,
        None => RenderSettings::default(),
    };
    settings.check().context("render settings")?;

    let pool = CommandBufferPool::new(settings.command_buffer_pool_capacity);
    let mut backend = GlBackend::new(HeadlessGl::new(), settings, 1280, 720);
    let scene = setup(&mut backend)?;
    let thread = RenderThread::spawn(backend).context("spawning the render thread")?;

    for frame in 0..FRAMES {
        let mut graph = RenderPassGraph::new();
        let shadows = graph.add_pass("shadows", move |b: &mut CommandBuffer| {
            record_shadows(scene, b)
        });
        let lighting = graph.add_pass("lighting", move |b: &mut CommandBuffer| {
            record_lighting(scene, frame, b)
        });
        let present = graph.add_pass("present", move |b: &mut CommandBuffer| {
            record_present(scene, frame, b)
        });
        graph.add_dependency(lighting, shadows);
        graph.add_dependency(present, lighting);

        let passes = graph
            .record(&pool, WORKERS)
            .with_context(|| format!("recording frame {frame}"))?;
        thread.submit_frame(passes.into_iter().map(|pass| pass.buffer).collect())?;
        log_frame(&thread.wait_frame()?);
    }

    let backend = thread.shutdown();
    log::info!(
        "done: {} device calls recorded, {} command buffers outstanding",
        backend.api().calls().len(),
        pool.outstanding()
    );
    Ok(())
}
