use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use videocompo_build::archive::zip_directory;
use videocompo_build::copier::{copy_file, copy_fileset, FileSet};

/// Create a source tree with N assets and N scripts
fn create_test_files(dir: &TempDir, count: usize) -> PathBuf {
    let src = dir.path().join("src");
    fs::create_dir_all(&src).unwrap();

    for i in 0..count {
        let subdir = src.join(format!("dir{}", i % 10));
        fs::create_dir_all(&subdir).unwrap();
        fs::write(subdir.join(format!("file{}.html", i)), format!("content {}", i)).unwrap();
        fs::write(subdir.join(format!("file{}.js", i)), format!("export default {};", i)).unwrap();
    }

    src
}

fn bench_copy_file(c: &mut Criterion) {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("source.png");
    let dst = temp.path().join("dest.png");

    fs::write(&src, vec![b'x'; 1024 * 1024]).unwrap();

    c.bench_function("copy_file_1mb", |b| {
        b.iter(|| {
            let _ = fs::remove_file(&dst);
            copy_file(black_box(&src), black_box(&dst)).unwrap()
        })
    });
}

/// Glob-filtered copy, half of the tree excluded
fn bench_copy_fileset(c: &mut Criterion) {
    let mut group = c.benchmark_group("copy_fileset");

    for file_count in [100, 500, 1000].iter() {
        let temp = TempDir::new().unwrap();
        let src = create_test_files(&temp, *file_count);
        let dst = temp.path().join("devserver");
        let set = FileSet::new(&src, &["**/*"], &["**/*.js"]).unwrap();

        group.throughput(Throughput::Elements(*file_count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(file_count), file_count, |b, _| {
            b.iter(|| {
                let _ = fs::remove_dir_all(&dst);
                copy_fileset(black_box(&set), black_box(&dst)).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_zip_directory(c: &mut Criterion) {
    let mut group = c.benchmark_group("zip_directory");

    for file_count in [100, 1000].iter() {
        let temp = TempDir::new().unwrap();
        let src = create_test_files(&temp, *file_count);
        let archive = temp.path().join("dist").join("VideoCompoLib-1.0.0.zip");

        group.throughput(Throughput::Elements(*file_count as u64 * 2));
        group.bench_with_input(BenchmarkId::from_parameter(file_count), file_count, |b, _| {
            b.iter(|| zip_directory(black_box(&src), black_box(&archive)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_copy_file, bench_copy_fileset, bench_zip_directory);
criterion_main!(benches);
