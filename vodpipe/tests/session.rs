mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::oneshot;

use common::*;
use vodpipe::Error;
use vodpipe::database::repositories::{FileVideoRepository, VideoRepository};
use vodpipe::domain::DownloadStatus;
use vodpipe::player::{PlaybackMode, PlaybackState};
use vodpipe::session::VideoSession;

fn two_segment_opener() -> MemoryOpener {
    MemoryOpener::with([
        (0, Body::Bytes(payload(0, 1000))),
        (1, Body::Bytes(payload(1, 2000))),
    ])
}

#[tokio::test]
async fn test_download_only_then_replay_locally() {
    let temp = TempDir::new().unwrap();
    let store = sqlite_store(temp.path()).await;
    let resolver = Arc::new(CountingResolver::new(vec![segment(1, 2000), segment(0, 1000)]));
    let opener = Arc::new(two_segment_opener());
    let videos = temp.path().join("videos");

    let session = VideoSession::new(
        context(store.clone(), resolver.clone(), opener.clone(), &videos),
        VIDEO_URL,
    )
    .unwrap();
    assert_eq!(session.video_id(), VIDEO_ID);

    let summary = session.download_only().await.unwrap();
    assert!(summary.starts_with("online: "), "{summary}");
    let first = summary.find("segment 0: 1000 bytes").expect("segment 0 summary");
    let second = summary.find("segment 1: 2000 bytes").expect("segment 1 summary");
    assert!(first < second, "{summary}");
    assert_eq!(*opener.orders.lock(), vec![0, 1]);

    let record = store.get_video(VIDEO_ID).await.unwrap().unwrap();
    assert_eq!(record.status, DownloadStatus::Downloaded);
    assert!(!record.playing);
    let orders: Vec<u32> = record.segments.iter().map(|s| s.order).collect();
    assert_eq!(orders, vec![0, 1]);
    assert_eq!(record.metadata, Some(metadata()));

    let dir = videos.join(VIDEO_ID);
    assert_eq!(std::fs::read(dir.join("0.flv")).unwrap(), payload(0, 1000));
    assert_eq!(std::fs::read(dir.join("1.flv")).unwrap(), payload(1, 2000));
    assert_eq!(resolver.calls(), 1);
    assert!(opener.referers.lock().iter().all(|r| r == VIDEO_URL));

    // A second request for the same video replays from disk without resolving again.
    let again = VideoSession::new(
        context(store.clone(), resolver.clone(), opener.clone(), &videos),
        VIDEO_URL,
    )
    .unwrap();
    let summary = again.download_only().await.unwrap();
    assert!(summary.starts_with("local: "), "{summary}");

    let host = Arc::new(DrainingDecoderHost::default());
    let controller = again.get_player(host.clone(), None).await.unwrap();
    assert_eq!(controller.mode(), PlaybackMode::Local);
    assert_eq!(resolver.calls(), 1);
    assert_eq!(opener.opened.load(Ordering::SeqCst), 2);

    let report = controller.run().await.unwrap();
    assert_eq!(report.state, PlaybackState::Done);
    let mut expected = payload(0, 1000);
    expected.extend(payload(1, 2000));
    assert_eq!(*host.received.lock(), expected);
}

#[tokio::test]
async fn test_live_playback_tees_to_decoder_and_disk() {
    let temp = TempDir::new().unwrap();
    let store = sqlite_store(temp.path()).await;
    let resolver = Arc::new(CountingResolver::new(vec![segment(0, 1000), segment(1, 2000)]));
    let opener = Arc::new(two_segment_opener());
    let videos = temp.path().join("videos");
    let session = VideoSession::new(
        context(store.clone(), resolver.clone(), opener, &videos),
        VIDEO_URL,
    )
    .unwrap();

    let host = Arc::new(DrainingDecoderHost::default());
    let (tx, rx) = oneshot::channel();
    let controller = session.get_player(host.clone(), Some(tx)).await.unwrap();
    assert_eq!(controller.mode(), PlaybackMode::Live);
    assert_eq!(controller.title(), "【MV】虹之间");
    assert_eq!(controller.uploader(), "someone");
    assert_eq!(controller.duration(), 3);

    // Resolution marks the video as in progress before any segment is fetched.
    let record = store.get_video(VIDEO_ID).await.unwrap().unwrap();
    assert_eq!(record.status, DownloadStatus::Downloading);

    let report = controller.run().await.unwrap();
    assert_eq!(report.state, PlaybackState::Done);
    assert_eq!(report.bytes(), 3000);
    assert!(controller.is_done());
    assert_eq!(host.starts(), 2);

    let mut expected = payload(0, 1000);
    expected.extend(payload(1, 2000));
    assert_eq!(*host.received.lock(), expected);

    let record = store.get_video(VIDEO_ID).await.unwrap().unwrap();
    assert_eq!(record.status, DownloadStatus::Downloaded);
    assert!(!record.playing);
    assert_eq!(record.segments.len(), 2);
    assert_eq!(
        std::fs::read(videos.join(VIDEO_ID).join("1.flv")).unwrap(),
        payload(1, 2000)
    );

    let finished = rx.await.unwrap();
    assert_eq!(finished.video_id, VIDEO_ID);
    assert_eq!(finished.state, PlaybackState::Done);
}

#[tokio::test]
async fn test_transfer_error_removes_partial_segment() {
    let temp = TempDir::new().unwrap();
    let store = sqlite_store(temp.path()).await;
    let resolver = Arc::new(CountingResolver::new(vec![segment(0, 1000), segment(1, 2000)]));
    let opener = Arc::new(MemoryOpener::with([
        (0, Body::Bytes(payload(0, 1000))),
        (1, Body::FailAfter(payload(1, 700))),
    ]));
    let videos = temp.path().join("videos");
    let session =
        VideoSession::new(context(store.clone(), resolver, opener, &videos), VIDEO_URL).unwrap();

    let err = session.download_only().await.unwrap_err();
    match err {
        Error::Download { video_id, source } => {
            assert_eq!(video_id, VIDEO_ID);
            assert!(matches!(*source, Error::Transfer(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let dir = videos.join(VIDEO_ID);
    assert!(dir.join("0.flv").exists());
    assert!(!dir.join("1.flv").exists());

    let record = store.get_video(VIDEO_ID).await.unwrap().unwrap();
    assert_eq!(record.status, DownloadStatus::Downloading);
    assert!(record.segments.is_empty());
}

#[tokio::test]
async fn test_not_found_is_surfaced_verbatim() {
    let temp = TempDir::new().unwrap();
    let store = sqlite_store(temp.path()).await;
    let session = VideoSession::new(
        context(
            store,
            Arc::new(CountingResolver::not_found()),
            Arc::new(MemoryOpener::default()),
            temp.path(),
        ),
        VIDEO_URL,
    )
    .unwrap();

    assert!(matches!(session.download_only().await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_stop_during_live_fetch_returns_promptly() {
    let temp = TempDir::new().unwrap();
    let store = sqlite_store(temp.path()).await;
    let resolver = Arc::new(CountingResolver::new(vec![segment(0, 1 << 30), segment(1, 10)]));
    let opener = Arc::new(MemoryOpener::with([
        (
            0,
            Body::Endless {
                chunk: 256,
                delay: Duration::from_millis(5),
            },
        ),
        (1, Body::Bytes(payload(1, 10))),
    ]));
    let videos = temp.path().join("videos");
    let session = VideoSession::new(
        context(store.clone(), resolver, opener.clone(), &videos),
        VIDEO_URL,
    )
    .unwrap();

    let host = Arc::new(DrainingDecoderHost::default());
    let (tx, rx) = oneshot::channel();
    let controller = Arc::new(session.get_player(host.clone(), Some(tx)).await.unwrap());

    let run = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.run().await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(controller.state(), PlaybackState::Playing);
    controller.stop();

    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run did not return after stop")
        .unwrap()
        .unwrap();
    assert_eq!(report.state, PlaybackState::Stopped);
    assert!(!controller.is_done());
    assert_eq!(rx.await.unwrap().state, PlaybackState::Stopped);

    // Only the first segment was ever opened and its partial file is gone.
    assert_eq!(opener.opened.load(Ordering::SeqCst), 1);
    assert!(!videos.join(VIDEO_ID).join("0.flv").exists());

    let record = store.get_video(VIDEO_ID).await.unwrap().unwrap();
    assert_eq!(record.status, DownloadStatus::Downloading);
    assert!(!record.playing);
}

#[tokio::test]
async fn test_file_store_round_trip_through_session() {
    let temp = TempDir::new().unwrap();
    let videos = temp.path().join("videos");
    let store: Arc<dyn VideoRepository> = Arc::new(FileVideoRepository::new(&videos));
    let resolver = Arc::new(CountingResolver::new(vec![segment(0, 1000), segment(1, 2000)]));
    let opener = Arc::new(two_segment_opener());

    let session = VideoSession::new(
        context(store.clone(), resolver.clone(), opener.clone(), &videos),
        VIDEO_URL,
    )
    .unwrap();
    session.download_only().await.unwrap();

    let dir = videos.join(VIDEO_ID);
    for name in ["videoinfo.json", "segments.json", "state.json", "0.flv", "1.flv"] {
        assert!(dir.join(name).is_file(), "{name} missing");
    }

    // A fresh repository over the same directory sees the completed download.
    let reopened: Arc<dyn VideoRepository> = Arc::new(FileVideoRepository::new(&videos));
    let record = reopened.get_video(VIDEO_ID).await.unwrap().unwrap();
    assert_eq!(record.status, DownloadStatus::Downloaded);
    assert_eq!(record.metadata, Some(metadata()));
    assert_eq!(record.segments, vec![segment(0, 1000), segment(1, 2000)]);

    let again =
        VideoSession::new(context(reopened, resolver.clone(), opener, &videos), VIDEO_URL).unwrap();
    assert!(again.download_only().await.unwrap().starts_with("local: "));
    assert_eq!(resolver.calls(), 1);
}
