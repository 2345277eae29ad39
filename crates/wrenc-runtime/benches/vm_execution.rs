use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wrenc_runtime::gc::{GarbageCollector, Traceable};
use wrenc_runtime::object::ObjHeader;
use wrenc_runtime::stack::Stack;
use wrenc_runtime::value::Value;

struct NoContainers;
impl Traceable for NoContainers {
    fn trace(&self, _header: *mut ObjHeader) -> Vec<Value> {
        Vec::new()
    }
}

fn bench_stack_push_pop(c: &mut Criterion) {
    c.bench_function("stack_push_pop_frame", |b| {
        b.iter(|| {
            let mut stack = Stack::new();
            stack.push_frame(0, 0, 4, 0).unwrap();
            for i in 0..4 {
                stack.store_local(i, black_box(Value::number(i as f64).unwrap())).unwrap();
            }
            stack.push(Value::number(1.0).unwrap()).unwrap();
            black_box(stack.pop().unwrap());
            stack.pop_frame().unwrap();
        });
    });
}

fn bench_gc_allocate_and_collect(c: &mut Criterion) {
    c.bench_function("gc_allocate_collect_cycle", |b| {
        b.iter(|| {
            let mut gc = GarbageCollector::new();
            let mut roots = Vec::new();
            for _ in 0..64 {
                let view = gc.allocate_managed(Value::NULL, 2).unwrap();
                roots.push(unsafe { Value::from_ptr(view.as_header_ptr()) }.unwrap());
            }
            gc.collect(roots.iter(), &|_| 2, &NoContainers);
            black_box(gc.stats());
        });
    });
}

criterion_group!(benches, bench_stack_push_pop, bench_gc_allocate_and_collect);
criterion_main!(benches);
