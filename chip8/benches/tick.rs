use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chip8::prelude::*;

/// Counting loop: v0 counts up to 0x64, then the program starts over.
#[rustfmt::skip]
const COUNTER: &[u8] = &[
    0x60, 0x00, // 0x200: LD  v0, 0
    0x70, 0x01, // 0x202: ADD v0, 1
    0x30, 0x64, // 0x204: SE  v0, 0x64
    0x12, 0x02, // 0x206: JP  0x202
    0x12, 0x00, // 0x208: JP  0x200
];

fn criterion_benchmark(c: &mut Criterion) {
    let mut vm = Chip8Vm::new(Chip8Conf::default());
    vm.load_program(COUNTER).unwrap();

    c.bench_function("counter loop", |b| {
        b.iter(|| {
            let step_count = black_box(1000_usize);
            black_box(vm.run_steps(step_count))
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
