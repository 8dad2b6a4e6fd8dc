use std::hint::black_box;
use std::sync::Arc;

use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use mediaload::{
    ChunkResponse, Downloader, DownloaderConfig, Endpoint, LoaderOptions, MemoryCache, ReadRequest,
    RemoteReadChannel, RequestId, StorageLocation,
};

const PART: u32 = 16 * 1024;

/// Remembers what was asked so the bench can answer it.
#[derive(Default)]
struct Backlog {
    next:    u64,
    pending: Vec<(RequestId, u32)>,
}

impl RemoteReadChannel for Backlog {
    fn issue(&mut self, _endpoint: &Endpoint, request: &ReadRequest) -> RequestId {
        let id = RequestId(self.next);
        self.next += 1;
        if let ReadRequest::File { limit, .. } = request {
            self.pending.push((id, *limit));
        }
        id
    }

    fn cancel(&mut self, id: RequestId) { self.pending.retain(|(pending, _)| *pending != id); }
}

fn download_all(loaders: u64, chunks: u64) -> usize {
    let config = DownloaderConfig::default().part_size(PART);
    let mut downloader = Downloader::new(config, Backlog::default(), Arc::new(MemoryCache::new()));
    let payload = Bytes::from(vec![7u8; PART as usize]);
    let size = u64::from(PART) * chunks;

    for content_id in 0..loaders {
        let location = StorageLocation::new((content_id % 4) as i32 + 1, content_id, 0);
        let id = downloader.add_storage_loader(location, LoaderOptions::default().size(size));
        downloader
            .start(id, content_id % 3 == 0, content_id % 5 == 0)
            .unwrap();
    }

    let mut answered = 0;
    while let Some((request, limit)) = downloader.channel_mut().pending.pop() {
        downloader.on_chunk(request, ChunkResponse::Bytes(payload.slice(..limit as usize)));
        answered += 1;
    }
    answered
}

fn bench_pump(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_pump");

    for loaders in [8u64, 64, 256] {
        let chunks = 8;
        group.throughput(Throughput::Elements(loaders * chunks));
        group.bench_with_input(BenchmarkId::new("loaders", loaders), &loaders, |b, &loaders| {
            b.iter(|| black_box(download_all(black_box(loaders), chunks)));
        });
    }

    group.finish();
}

fn bench_clear_priorities(c: &mut Criterion) {
    c.bench_function("reprioritize_256", |b| {
        b.iter(|| {
            let mut downloader = Downloader::new(
                DownloaderConfig::default().storage_queue_limit(1),
                Backlog::default(),
                Arc::new(MemoryCache::new()),
            );
            let ids: Vec<_> = (0..256)
                .map(|content_id| {
                    let id = downloader.add_storage_loader(
                        StorageLocation::new(1, content_id, 0),
                        LoaderOptions::default().size(1),
                    );
                    downloader.start(id, false, false).unwrap();
                    id
                })
                .collect();
            for id in ids.iter().rev() {
                downloader.clear_priorities();
                downloader.start(*id, true, true).unwrap();
            }
            black_box(downloader.current_priority())
        });
    });
}

criterion_group!(benches, bench_pump, bench_clear_priorities);
criterion_main!(benches);
