//! Interception pipeline behaviour against in-memory remote tracks.

use parking_lot::Mutex;
use std::borrow::Cow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use confmix::audio::{AudioFormat, Diagnostics};
use confmix::intercept::side_state::{SideKey, SideStateStore, SideValue};
use confmix::intercept::{
    attach_interceptor, detach_interceptor, interceptor_fn, InterceptDecision, InterceptionPipeline,
    MutingInterceptor,
};
use confmix::track::{
    MemoryRemoteTrack, Playout, RemoteAudioSink, RemoteAudioTrack, RemoteFrame, SinkVerdict, TrackId,
};

fn remote(id: &str) -> MemoryRemoteTrack {
    MemoryRemoteTrack::new(id, AudioFormat::pcm16(16_000, 1).unwrap())
}

fn isolated() -> InterceptionPipeline {
    InterceptionPipeline::new(Arc::new(SideStateStore::new()))
}

#[test]
fn attach_detach_restores_enabled_flag_and_clears_state() {
    for initially_enabled in [true, false] {
        let pipeline = isolated();
        let track = remote("peer");
        track.set_enabled(initially_enabled);

        let muting = MutingInterceptor::new(interceptor_fn(|_| InterceptDecision::play()));
        pipeline.attach(&track, Arc::new(muting)).unwrap();
        assert!(!track.is_enabled());
        assert_eq!(
            pipeline.store().get(track.id(), SideKey::PriorEnabled),
            Some(SideValue::PriorEnabled(initially_enabled))
        );

        assert!(pipeline.detach(&track));
        assert_eq!(track.is_enabled(), initially_enabled);
        assert!(pipeline.store().entry(track.id()).is_none());
        assert_eq!(track.sink_count(), 0);
    }
}

#[test]
fn reattach_leaves_one_sink_and_one_entry() {
    let pipeline = isolated();
    let track = remote("peer");
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let counter = first.clone();
    pipeline
        .attach(
            &track,
            interceptor_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                InterceptDecision::play()
            }),
        )
        .unwrap();
    let counter = second.clone();
    pipeline
        .attach(
            &track,
            interceptor_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                InterceptDecision::play()
            }),
        )
        .unwrap();

    assert_eq!(track.sink_count(), 1);
    assert_eq!(pipeline.store().len(), 1);

    track.deliver(&[1, 0, 2, 0], Duration::ZERO);
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);

    assert!(pipeline.detach(&track));
    assert!(!pipeline.detach(&track));
    assert!(pipeline.store().is_empty());
}

#[test]
fn interceptor_copies_frame_before_it_is_discarded() {
    let pipeline = isolated();
    let track = remote("peer");
    let copies = Arc::new(Mutex::new(Vec::new()));
    let sink = copies.clone();

    pipeline
        .attach(
            &track,
            interceptor_fn(move |frame| {
                sink.lock().push((
                    frame.track_id.clone(),
                    frame.descriptor.frame_count,
                    frame.data.to_vec(),
                    frame.timestamp,
                ));
                InterceptDecision::suppress()
            }),
        )
        .unwrap();

    let mut block = vec![4u8, 0, 5, 0];
    assert_eq!(
        track.deliver(&block, Duration::from_millis(20)),
        Playout::Suppressed
    );
    // The decoder reuses its buffer; the copy must not change
    block.fill(0);

    let copies = copies.lock();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].0, TrackId::from("peer"));
    assert_eq!(copies[0].1, 2);
    assert_eq!(copies[0].2, vec![4, 0, 5, 0]);
    assert_eq!(copies[0].3, Duration::from_millis(20));
}

#[test]
fn modified_samples_reach_the_speaker() {
    let pipeline = isolated();
    let track = remote("peer");
    pipeline
        .attach(
            &track,
            interceptor_fn(|frame| {
                // Halve every sample
                let halved = frame
                    .data
                    .chunks_exact(2)
                    .flat_map(|b| (i16::from_le_bytes([b[0], b[1]]) / 2).to_le_bytes())
                    .collect();
                InterceptDecision::replace(halved)
            }),
        )
        .unwrap();

    let data = [100i16.to_le_bytes(), (-50i16).to_le_bytes()].concat();
    let expected = [50i16.to_le_bytes(), (-25i16).to_le_bytes()].concat();
    assert_eq!(
        track.deliver(&data, Duration::ZERO),
        Playout::Speaker(Cow::Owned(expected))
    );
}

struct Recorder(Mutex<usize>);

impl RemoteAudioSink for Recorder {
    fn on_frame(&self, _frame: &RemoteFrame<'_>) -> SinkVerdict {
        *self.0.lock() += 1;
        SinkVerdict::Pass
    }
}

#[test]
fn other_sinks_keep_receiving_frames() {
    let pipeline = isolated();
    let track = remote("peer");
    let recorder = Arc::new(Recorder(Mutex::new(0)));
    track.add_sink(recorder.clone());

    let muting = MutingInterceptor::new(interceptor_fn(|_| InterceptDecision::play()));
    pipeline.attach(&track, Arc::new(muting)).unwrap();
    track.deliver(&[0, 0], Duration::ZERO);
    pipeline.detach(&track);
    track.deliver(&[0, 0], Duration::ZERO);

    assert_eq!(*recorder.0.lock(), 2);
    assert_eq!(track.sink_count(), 1);
}

#[test]
fn panicking_interceptor_does_not_reach_decode_thread() {
    let (diagnostics, mut rx) = Diagnostics::channel(8);
    let pipeline = isolated().with_diagnostics(diagnostics);
    let track = remote("peer");
    pipeline
        .attach(
            &track,
            interceptor_fn(|frame| {
                if frame.timestamp > Duration::ZERO {
                    panic!("bad frame");
                }
                InterceptDecision::play()
            }),
        )
        .unwrap();

    assert!(matches!(
        track.deliver(&[1, 0], Duration::ZERO),
        Playout::Speaker(_)
    ));
    assert_eq!(
        track.deliver(&[1, 0], Duration::from_millis(10)),
        Playout::Suppressed
    );
    assert!(rx.try_recv().is_ok());

    // Still attached and still working afterwards
    assert!(matches!(
        track.deliver(&[1, 0], Duration::ZERO),
        Playout::Speaker(_)
    ));
}

#[test]
fn global_helpers_share_one_store() {
    let track = remote(&TrackId::random().to_string());
    attach_interceptor(&track, interceptor_fn(|_| InterceptDecision::play())).unwrap();
    assert!(InterceptionPipeline::global().is_intercepting(track.id()));
    assert!(SideStateStore::global().contains(track.id()));

    assert!(detach_interceptor(&track));
    assert!(!SideStateStore::global().contains(track.id()));
    assert!(!detach_interceptor(&track));
}

#[test]
fn dropped_track_leaves_orphan_until_purged() {
    let pipeline = isolated();
    let kept = remote("kept");
    {
        let gone = remote("gone");
        let muting = MutingInterceptor::new(interceptor_fn(|_| InterceptDecision::play()));
        pipeline.attach(&gone, Arc::new(muting)).unwrap();
    }
    pipeline
        .attach(&kept, interceptor_fn(|_| InterceptDecision::play()))
        .unwrap();

    let orphans = pipeline.store().orphans(&[kept.id().clone()]);
    assert_eq!(orphans, vec![TrackId::from("gone")]);
    assert!(pipeline.store().purge(&orphans[0]).is_some());
    assert_eq!(pipeline.store().len(), 1);
}

#[test]
fn concurrent_attach_detach_with_delivery() {
    let pipeline = Arc::new(isolated());
    let track = Arc::new(remote("busy"));

    let decoder = {
        let track = track.clone();
        thread::spawn(move || {
            for i in 0..2000u64 {
                track.deliver(&[1, 0, 2, 0], Duration::from_micros(i));
            }
        })
    };

    for _ in 0..200 {
        let muting = MutingInterceptor::new(interceptor_fn(|_| InterceptDecision::play()));
        pipeline.attach(track.as_ref(), Arc::new(muting)).unwrap();
        pipeline.detach(track.as_ref());
    }
    decoder.join().unwrap();

    assert!(track.is_enabled());
    assert_eq!(track.sink_count(), 0);
    assert!(pipeline.store().is_empty());
}
