//! Performance benchmarks for link resolution and graph maintenance
//!
//! Measures how the cost of the hot paths scales with vault size:
//! - Reference token resolution against the whole vault
//! - Full graph initialization
//! - Incremental upsert of a note with many namesakes
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use uplink_core::{config::LinkSettings, graph::LinkGraph, index::VaultIndex, paths::PathResolver};

/// A synthetic vault: `folders` folders of `per_folder` notes each. Every folder has a map
/// linking its notes, every note declares its map as parent and links to a namesake note of
/// the next folder.
fn synthetic_vault(folders: usize, per_folder: usize) -> Vec<(String, String)> {
    let mut notes = Vec::with_capacity(folders * (per_folder + 1));
    for folder in 0..folders {
        let links = (0..per_folder)
            .map(|n| format!("- [[F{folder}/Note {n}]]"))
            .collect::<Vec<_>>()
            .join("\n");
        notes.push((format!("F{folder}/Map {folder}.md"), format!("#MOC\n{links}")));
        for n in 0..per_folder {
            let next = (folder + 1) % folders;
            notes.push((
                format!("F{folder}/Note {n}.md"),
                format!("---\nup: \"[[Map {folder}]]\"\n---\n[[Map {folder}]] [[F{next}/Note {n}]] [[Note {n}]]"),
            ));
        }
    }
    notes
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_token");
    for folders in [10, 100] {
        let notes = synthetic_vault(folders, 20);
        let resolver = PathResolver::new(notes.iter().map(|(path, _)| path.as_str()));
        group.bench_with_input(BenchmarkId::from_parameter(folders), &resolver, |b, resolver| {
            b.iter(|| {
                black_box(resolver.resolve("F3/Note 7"));
                black_box(resolver.resolve("Note 7"));
                black_box(resolver.resolve("Map 3"));
            })
        });
    }
    group.finish();
}

fn bench_initialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("initialize");
    group.sample_size(20);
    for folders in [10, 50] {
        let index = VaultIndex::from_notes(synthetic_vault(folders, 20));
        group.bench_with_input(BenchmarkId::from_parameter(folders), &index, |b, index| {
            b.iter(|| {
                let mut graph = LinkGraph::new(LinkSettings::default());
                graph.initialize(index).unwrap();
                black_box(graph.len())
            })
        });
    }
    group.finish();
}

fn bench_upsert_namesake(c: &mut Criterion) {
    let mut index = VaultIndex::from_notes(synthetic_vault(50, 20));
    let mut graph = LinkGraph::new(LinkSettings::default());
    graph.initialize(&index).unwrap();

    c.bench_function("upsert_namesake", |b| {
        b.iter(|| {
            index.upsert_note("Extra/Note 7.md", "[[Map 0]]");
            black_box(graph.upsert(&index, "Extra/Note 7.md").unwrap());
            index.remove_note("Extra/Note 7.md");
            black_box(graph.upsert(&index, "Extra/Note 7.md").unwrap());
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(50);
    targets = bench_resolve, bench_initialize, bench_upsert_namesake
}
criterion_main!(benches);
