use criterion::{criterion_group, criterion_main, Criterion};
use gaussio::{read_deck, write_deck, write_xyz, FileFormat, GaussianOut};
use std::hint::black_box;
use std::path::Path;
use std::time::Duration;

fn load_log(path: &Path) -> usize {
    let out = GaussianOut::open(path).unwrap();
    black_box(out.snapshots().len() + out.energies().len())
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("gaussian");
    group.measurement_time(Duration::from_secs(6));

    let path = Path::new("./src/tests-data/gaussian/water_opt.log");
    group.bench_function("read optimization log", |b| b.iter(|| load_log(path)));

    let path = Path::new("./src/tests-data/gaussian/two_links.log");
    let text = std::fs::read_to_string(path).unwrap();
    group.bench_function("split linked log", |b| {
        b.iter(|| GaussianOut::parse_links(black_box(&text)).unwrap().len())
    });

    let deck = std::fs::read_to_string("./src/tests-data/gaussian/two_jobs.gjf").unwrap();
    group.bench_function("round trip input deck", |b| {
        b.iter(|| write_deck(&read_deck(black_box(&deck)).unwrap()).unwrap())
    });

    let out = GaussianOut::open(Path::new("./src/tests-data/gaussian/water_opt.log")).unwrap();
    let last = out.last_snapshot().unwrap();
    group.bench_function("export xyz", |b| {
        b.iter(|| write_xyz(black_box(last), Some("final")).unwrap())
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
