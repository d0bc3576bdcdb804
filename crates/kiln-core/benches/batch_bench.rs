use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kiln_core::math::LinearRgba;
use kiln_core::renderer::command::*;
use kiln_core::renderer::{BufferId, GenericDrawCommand, PipelineHash, ShaderProgramId};

/// A pass shaped like a typical forward pass: one pipeline per material,
/// per-object push constants followed by one draw each.
fn record_scene(buffer: &mut CommandBuffer, objects: u32) {
    buffer.add(BeginRenderPassCommand::default());
    for material in 0..8u32 {
        buffer.add(BindPipelineCommand {
            pipeline: PipelineHash(material as u64),
            program: ShaderProgramId(material),
        });
        for object in 0..objects / 8 {
            let mut constants = PushConstants::default();
            constants.set("colour", UniformValue::Color(LinearRgba::RED));
            buffer.add(SendPushConstantsCommand { constants });
            buffer.add(DrawCommandsCommand {
                draws: vec![GenericDrawCommand::indexed(
                    BufferId(1 + material),
                    object * 36,
                    36,
                )],
            });
        }
    }
    buffer.add(EndRenderPassCommand::default());
}

fn bench_batching(c: &mut Criterion) {
    let mut group = c.benchmark_group("Command Buffer");
    let mut buffer = CommandBuffer::new();

    group.bench_function("Record 4096 objects", |b| {
        b.iter(|| {
            buffer.clear(false);
            record_scene(&mut buffer, 4096);
            black_box(buffer.len());
        });
    });

    group.bench_function("Record + batch 4096 objects", |b| {
        b.iter(|| {
            buffer.clear(false);
            record_scene(&mut buffer, 4096);
            black_box(buffer.batch());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_batching);
criterion_main!(benches);
