use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wrenc_bytecode::signature::{find_signature_id, Signature, SignatureKind};
use wrenc_bytecode::{ClassDescriptorBuilder, CompiledModule};

fn bench_signature_hash(c: &mut Criterion) {
    c.bench_function("signature_id", |b| {
        b.iter(|| find_signature_id(black_box("foo(_,_)")));
    });

    c.bench_function("signature_canonical", |b| {
        let sig = Signature::new("foo", SignatureKind::Method, 3);
        b.iter(|| black_box(sig.canonical()));
    });
}

fn bench_class_descriptor(c: &mut Criterion) {
    c.bench_function("class_descriptor_encode", |b| {
        b.iter(|| {
            let mut builder = ClassDescriptorBuilder::new();
            for i in 0..32 {
                builder.add_method(&format!("m{i}(_)"), i, false, false);
            }
            black_box(builder.finish())
        });
    });
}

fn bench_module_roundtrip(c: &mut Criterion) {
    c.bench_function("compiled_module_encode_decode", |b| {
        let mut module = CompiledModule::new(wrenc_bytecode::Metadata {
            module_name: "bench".into(),
            source_file: None,
        });
        module.globals_table = vec![0u8; 256];
        b.iter(|| {
            let bytes = module.encode();
            black_box(CompiledModule::decode(&bytes).unwrap());
        });
    });
}

criterion_group!(benches, bench_signature_hash, bench_class_descriptor, bench_module_roundtrip);
criterion_main!(benches);
