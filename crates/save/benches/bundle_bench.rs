//! Bundle capture / encode / read throughput at a few scene sizes.
//!
//! Run with: `cargo bench -p save --bench bundle_bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use save::bundle_io::{encode_bundle, read_bundle, write_bundle_files};
use save::scene_host::MemorySceneHost;
use save::{GameObject, SaveFields, SaveSubsystem, SaveableEntity, SceneName, SharedObject, UniqueId};

#[derive(Default, SaveFields)]
struct Crate {
    #[save(skip)]
    uid: UniqueId,
    #[save(skip)]
    go: GameObject,
    label: String,
    contents: u32,
    weight: f32,
}

impl SaveableEntity for Crate {
    const TYPE_NAME: &'static str = "Crate";

    fn unique_id(&self) -> &UniqueId {
        &self.uid
    }
    fn unique_id_mut(&mut self) -> &mut UniqueId {
        &mut self.uid
    }
    fn game_object(&self) -> &GameObject {
        &self.go
    }
    fn game_object_mut(&mut self) -> &mut GameObject {
        &mut self.go
    }
}

const SCENES: [&str; 4] = ["Harbor", "Cellar", "Tower", "Market"];

fn populated(count: usize) -> (MemorySceneHost, SaveSubsystem) {
    let host = MemorySceneHost::new();
    let mut subsystem = SaveSubsystem::default();
    for scene in SCENES {
        host.load_scene(scene);
    }
    for i in 0..count {
        let obj = host.spawn(SharedObject::new(Crate {
            uid: UniqueId::generate(),
            go: GameObject::in_scene(SCENES[i % SCENES.len()]),
            label: format!("crate #{i}"),
            contents: i as u32,
            weight: i as f32 * 0.5,
        }));
        subsystem.register(&obj);
    }
    (host, subsystem)
}

fn bench_bundle(c: &mut Criterion) {
    let mut group = c.benchmark_group("bundle");
    group.sample_size(20);

    for count in [1_000usize, 10_000] {
        let (host, mut subsystem) = populated(count);

        group.bench_with_input(BenchmarkId::new("capture", count), &count, |b, _| {
            b.iter(|| black_box(subsystem.capture_bundle(&host)));
        });

        let bundle = subsystem.capture_bundle(&host);
        for compress in [false, true] {
            let id = format!("{count}/lz4={compress}");
            group.bench_function(BenchmarkId::new("encode", &id), |b| {
                b.iter(|| black_box(encode_bundle(&bundle, "bench", compress).unwrap()));
            });

            let dir = std::env::temp_dir().join(format!("scene_save_bench_{count}_{compress}"));
            let _ = std::fs::remove_dir_all(&dir);
            let encoded = encode_bundle(&bundle, "bench", compress).unwrap();
            write_bundle_files(&dir, &encoded, false).unwrap();
            let scenes: Vec<SceneName> = SCENES.iter().map(|s| SceneName::from(*s)).collect();
            group.bench_function(BenchmarkId::new("read", &id), |b| {
                b.iter(|| black_box(read_bundle(&dir, &scenes, "bench").unwrap()));
            });
            let _ = std::fs::remove_dir_all(&dir);
        }
    }
    group.finish();
}

criterion_group!(benches, bench_bundle);
criterion_main!(benches);
