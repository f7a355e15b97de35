//! End-to-end tests against a scripted stand-in for the extractor.
#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use grabx_core::downloader::DownloadPhase;
use grabx_core::playlist::list_playlist;
use grabx_core::{
    BEST_LABEL, DownloadEvent, DownloadExecutor, DownloadJob, EngineConfig, EngineError, Playlist, ProbeRequest,
    ProbeService, ProbeState, quality_menu, spawn_prefetch,
};
use tokio::sync::mpsc;

const FAKE_TOOL: &str = r#"#!/bin/sh
mode=download
last=""
for arg in "$@"; do
  case "$arg" in
    -F) mode=probe ;;
    --flat-playlist) mode=list ;;
  esac
  last="$arg"
done
dir=$(dirname "$0")

case "$mode" in
  probe)
    echo x >> "$dir/count-$(basename "$last")"
    case "$last" in
      *slow*) sleep 0.3 ;;
    esac
    cat <<'LISTING'
[info] Available formats for abc:
ID  EXT   RESOLUTION FPS CH |   FILESIZE   TBR PROTO | VCODEC
139 m4a   audio only      2 |    1.20MiB   49k https | audio only
135 mp4   854x480     30    |   12.50MiB  513k https | avc1.4d401f video only 480p
136 mp4   1280x714    30    |   25.00MiB 1025k https | avc1.4d401f video only
137 mp4   1920x1080   30    |  500.00MiB 2050k https | avc1.640028 video only 1080p
401 mp4   3840x2160   60    |    2.50GiB 9000k https | av01.0.13M.08 video only 2160p60
LISTING
    ;;
  list)
    printf 'aaa111|First clip\nbbb222|[Private video]\nccc333|Third clip\n'
    ;;
  *)
    case "$last" in
      *fail*)
        echo "ERROR: unable to download"
        exit 2
        ;;
      *slow*)
        i=0
        while [ $i -lt 100 ]; do
          echo "[download]   $i.0% of 10.00MiB at 1.00MiB/s ETA 00:10"
          i=$((i + 1))
          sleep 0.1
        done
        exit 0
        ;;
    esac
    echo "[download] Destination: clip.f137.mp4"
    echo "[download]  10.0% of 10.00MiB at 1.00MiB/s ETA 00:09"
    echo "[download] 100.0% of 10.00MiB at 2.00MiB/s ETA 00:00"
    echo "[Merger] Merging formats into \"clip.mp4\""
    exit 0
    ;;
esac
"#;

fn fake_tool() -> &'static Path {
    static TOOL: OnceLock<PathBuf> = OnceLock::new();
    TOOL.get_or_init(|| {
        use std::os::unix::fs::PermissionsExt;

        let dir = std::env::temp_dir().join(format!("grabx-engine-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let tool = dir.join("yt-dlp");
        std::fs::write(&tool, FAKE_TOOL).unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        tool
    })
}

fn config() -> EngineConfig {
    EngineConfig {
        tool_path: fake_tool().to_path_buf(),
        probe_workers: 2,
        prefetch_first_delay_ms: 1,
        prefetch_rest_delay_ms: 1,
        ..EngineConfig::default()
    }
}

fn unique(name: &str) -> String {
    format!("{}-{}", name, uuid::Uuid::new_v4())
}

fn probe_count(url_tail: &str) -> usize {
    let path = fake_tool().parent().unwrap().join(format!("count-{}", url_tail));
    std::fs::read_to_string(path).map(|s| s.lines().count()).unwrap_or(0)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<DownloadEvent>) -> Vec<DownloadEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn probe_yields_normalized_heights_and_sizes() {
    let service = ProbeService::new(&config());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let tail = unique("video");
    let url = format!("https://example.com/{}", tail);

    assert_eq!(service.request("vid1", &url, tx.clone()), ProbeRequest::Submitted);
    let event = tokio::time::timeout(Duration::from_secs(10), rx.recv()).await.unwrap().unwrap();

    assert_eq!(event.id, "vid1");
    assert!(!event.failed);
    assert_eq!(event.result.heights.iter().copied().collect::<Vec<_>>(), vec![480, 720, 1080, 2160]);
    assert_eq!(event.result.size_by_height.get(&1080).map(String::as_str), Some("524 MB"));
    assert_eq!(event.result.size_by_height.get(&2160).map(String::as_str), Some("2.7 GB"));

    let menu = quality_menu(&event.result);
    assert_eq!(menu.labels, vec![BEST_LABEL, "2160p (4K)", "1080p", "720p", "480p"]);
    assert_eq!(menu.size_for("720p"), Some("26 MB"));

    assert!(matches!(service.request("vid1", &url, tx), ProbeRequest::Cached(_)));
    assert_eq!(probe_count(&tail), 1);
    service.shutdown().await;
}

#[tokio::test]
async fn concurrent_requests_for_one_id_run_one_probe() {
    let service = ProbeService::new(&config());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let tail = unique("slow");
    let url = format!("https://example.com/{}", tail);

    assert_eq!(service.request("dup", &url, tx.clone()), ProbeRequest::Submitted);
    assert_eq!(service.request("dup", &url, tx.clone()), ProbeRequest::AlreadyInFlight);

    let event = tokio::time::timeout(Duration::from_secs(10), rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.id, "dup");
    assert!(matches!(service.request("dup", &url, tx), ProbeRequest::Cached(_)));

    service.shutdown().await;
    assert_eq!(probe_count(&tail), 1);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn playlist_listing_marks_private_item_unavailable() {
    let items = list_playlist(fake_tool(), "https://example.com/playlist").await.unwrap();

    assert_eq!(items.len(), 3);
    assert_eq!(items.iter().filter(|i| i.unavailable).count(), 1);
    assert!(items[1].unavailable);
    assert_eq!(items[1].unavailable_reason.as_deref(), Some("Private video"));
    assert_eq!(items[0].display_title(), "1. First clip");

    let playlist = Playlist::new(items);
    let jobs = playlist.selected_jobs(Path::new("/tmp/grabx-out"), false);
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|job| !job.source_url.contains("bbb222")));
}

#[tokio::test]
async fn prefetch_fills_playlist_menus() {
    let config = config();
    let service = Arc::new(ProbeService::new(&config));
    let items = list_playlist(fake_tool(), "https://example.com/playlist").await.unwrap();
    let playlist = Arc::new(Mutex::new(Playlist::new(items)));
    playlist.lock().unwrap().set_group_quality("720p");
    let (tx, mut rx) = mpsc::unbounded_channel();

    let stats = spawn_prefetch(Arc::clone(&service), Arc::clone(&playlist), tx, &config).join().await;
    assert_eq!(stats.submitted, 2);
    assert_eq!(stats.skipped, 1);

    for _ in 0..stats.submitted {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv()).await.unwrap().unwrap();
        assert!(playlist.lock().unwrap().apply_probe_event(&event));
    }

    let playlist = playlist.lock().unwrap();
    for id in ["aaa111", "ccc333"] {
        let item = playlist.get(id).unwrap();
        assert_eq!(item.probe_state, ProbeState::Done);
        assert_eq!(item.desired_quality, "720p");
        assert_eq!(item.size_for("1080p"), Some("524 MB"));
    }
    assert_eq!(playlist.get("bbb222").unwrap().probe_state, ProbeState::NotStarted);
    drop(playlist);
    service.shutdown().await;
}

#[tokio::test]
async fn cancelled_prefetch_still_caches_the_running_job() {
    let config = EngineConfig {
        prefetch_first_delay_ms: 1000,
        ..config()
    };
    let service = Arc::new(ProbeService::new(&config));
    let first = format!("https://example.com/{}", unique("slow"));
    let second = format!("https://example.com/{}", unique("slow"));
    let playlist = Arc::new(Mutex::new(Playlist::from_listing(&format!("{first}|Slow one\n{second}|Slow two\n"))));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle = spawn_prefetch(Arc::clone(&service), Arc::clone(&playlist), tx, &config);
    tokio::time::timeout(Duration::from_secs(5), async {
        while playlist.lock().unwrap().get(&first).unwrap().probe_state != ProbeState::InFlight {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    handle.cancel();

    let stats = handle.join().await;
    assert!(stats.cancelled);
    assert_eq!(stats.submitted, 1);

    let event = tokio::time::timeout(Duration::from_secs(10), rx.recv()).await.unwrap().unwrap();
    assert_eq!(event.id, first);
    assert!(!event.failed);

    let cached = service.cache().get(&first).unwrap();
    assert_eq!(cached.heights.iter().copied().collect::<Vec<_>>(), vec![480, 720, 1080, 2160]);
    assert!(service.cache().get(&second).is_none());
    assert_eq!(playlist.lock().unwrap().get(&second).unwrap().probe_state, ProbeState::NotStarted);
    service.shutdown().await;
}

#[tokio::test]
async fn download_streams_events_in_order() {
    let out = std::env::temp_dir().join(unique("grabx-dl")).join("nested");
    let executor = DownloadExecutor::new(fake_tool());
    let job = DownloadJob::video("https://example.com/watch", &out, "720p");
    let (tx, mut rx) = mpsc::unbounded_channel();

    let exit_code = executor.run(&job, &tx, None).await.unwrap();

    assert_eq!(exit_code, 0);
    assert!(out.is_dir());

    let events = drain(&mut rx);
    assert_eq!(events.first(), Some(&DownloadEvent::Status("Starting...".to_string())));
    assert_eq!(events.last(), Some(&DownloadEvent::Status("Completed".to_string())));
    assert_eq!(events[1], DownloadEvent::Phase(DownloadPhase::NewFile));

    let percents: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            DownloadEvent::Progress(p) => Some(p.percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents.len(), 2);
    assert!((percents[0] - 0.1).abs() < 1e-9);
    assert!((percents[1] - 1.0).abs() < 1e-9);
    assert!(events.contains(&DownloadEvent::Phase(DownloadPhase::PostProcessing)));

    let _ = std::fs::remove_dir_all(out.parent().unwrap());
}

#[tokio::test]
async fn failed_download_reports_exit_code() {
    let executor = DownloadExecutor::new(fake_tool());
    let job = DownloadJob::audio("https://example.com/fail", std::env::temp_dir(), "mp3");
    let (tx, mut rx) = mpsc::unbounded_channel();

    let exit_code = executor.run(&job, &tx, None).await.unwrap();

    assert_eq!(exit_code, 2);
    let events = drain(&mut rx);
    assert!(events.contains(&DownloadEvent::Status("ERROR: unable to download".to_string())));
    assert_eq!(events.last(), Some(&DownloadEvent::Status("Failed (exit 2)".to_string())));
}

#[tokio::test]
async fn cancelling_a_download_kills_the_process() {
    let executor = Arc::new(DownloadExecutor::new(fake_tool()));
    let job = DownloadJob::video("https://example.com/slow", std::env::temp_dir(), BEST_LABEL);
    let cancel = Arc::new(AtomicBool::new(false));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle = executor.spawn(job, Arc::new(tx), Some(Arc::clone(&cancel)));

    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv()).await.unwrap().unwrap();
        if matches!(event, DownloadEvent::Progress(_)) {
            break;
        }
    }
    cancel.store(true, std::sync::atomic::Ordering::SeqCst);

    let result = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert!(matches!(result, Err(EngineError::Cancelled)));

    let events = drain(&mut rx);
    assert_eq!(events.last(), Some(&DownloadEvent::Status("Cancelled".to_string())));
}

#[tokio::test]
async fn missing_tool_is_reported_for_every_entry_point() {
    let missing = Path::new("/definitely/not/here/yt-dlp");

    let listing = list_playlist(missing, "https://example.com/playlist").await;
    assert!(matches!(listing, Err(EngineError::ToolNotFound { .. })));

    let executor = DownloadExecutor::new(missing);
    let job = DownloadJob::video("https://example.com/v", std::env::temp_dir(), BEST_LABEL);
    let (tx, mut rx) = mpsc::unbounded_channel();
    assert!(matches!(executor.run(&job, &tx, None).await, Err(EngineError::ToolNotFound { .. })));
    assert_eq!(drain(&mut rx).last(), Some(&DownloadEvent::Status("Failed (exit -1)".to_string())));
}
