//! `queuesync` demo binary.
//!
//! Loads the config, seeds an in-memory playback session (optionally from a
//! JSON fixture) and replays a short script of user gestures against it,
//! logging every published queue view.
//!
//! Usage: `queuesync [config.toml] [fixture.json]`

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::broadcast::{error::RecvError, Receiver};

use queuesync::{
    collaborators::PlaybackState,
    config_persistence::{default_config_path, load_config},
    in_memory::{InMemoryLibrary, InMemoryNetworkMonitor, InMemoryPlaybackEngine, RecordingNoticeSink},
    protocol::{Message, QueueMessage},
    spawn_queue_session, QueueSession, QueueSessionConfig, QueueView, Track,
};

const GESTURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Initial engine and library contents for a demo run.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct DemoFixture {
    #[serde(default)]
    queue: Vec<Track>,
    #[serde(default)]
    library: Vec<Track>,
    #[serde(default)]
    active_index: usize,
    #[serde(default)]
    position_seconds: f64,
    #[serde(default = "default_reachable")]
    reachable: bool,
}

fn default_reachable() -> bool {
    true
}

impl Default for DemoFixture {
    fn default() -> Self {
        let online = |id: &str, title: &str| {
            Track::new(id, format!("https://stream.example.com/{id}.mp3")).with_title(title)
        };
        let downloaded = |id: &str, title: &str| {
            online(id, title).downloaded_at(format!("/data/user/0/queuesync/files/{id}.mp3"))
        };
        Self {
            queue: vec![
                online("on-1", "Northern Lights"),
                online("on-2", "Low Tide"),
                downloaded("dl-1", "Paper Boats"),
                online("on-3", "Glass Harbor"),
            ],
            library: vec![
                downloaded("dl-1", "Paper Boats"),
                downloaded("dl-2", "Quiet Engines"),
            ],
            active_index: 1,
            position_seconds: 37.5,
            reachable: true,
        }
    }
}

fn load_fixture(path: &Path) -> Result<DemoFixture, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn log_view(label: &str, view: &QueueView) {
    let ids: Vec<&str> = view.visible_queue.iter().map(|t| t.id.as_str()).collect();
    info!(
        "{}: visible={:?} current_index={:?} local={} offline={} dragging={}",
        label, ids, view.current_index, view.is_local_source, view.is_offline, view.is_dragging
    );
}

async fn wait_for_message<F>(receiver: &mut Receiver<Message>, predicate: F) -> Option<Message>
where
    F: Fn(&Message) -> bool,
{
    tokio::time::timeout(GESTURE_TIMEOUT, async {
        loop {
            match receiver.recv().await {
                Ok(message) if predicate(&message) => return Some(message),
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

async fn settle(session: &QueueSession) {
    let mut receiver = session.subscribe();
    session.refresh();
    let _ = wait_for_message(&mut receiver, |m| {
        matches!(m, Message::Queue(QueueMessage::ViewChanged(_)))
    })
    .await;
}

async fn run_script(fixture: DemoFixture, config: queuesync::config::Config) {
    let engine = Arc::new(InMemoryPlaybackEngine::with_queue(fixture.queue.clone()));
    if fixture.active_index < fixture.queue.len() {
        engine.set_active(
            fixture.active_index,
            PlaybackState::Playing,
            fixture.position_seconds,
        );
    }
    let network = Arc::new(InMemoryNetworkMonitor::new(fixture.reachable));
    let notices = Arc::new(RecordingNoticeSink::default());

    let session = spawn_queue_session(QueueSessionConfig {
        engine: engine.clone(),
        library: Arc::new(InMemoryLibrary::new(fixture.library.clone())),
        network: network.clone(),
        notices: notices.clone(),
        config,
    })
    .await;
    let mut receiver = session.subscribe();

    settle(&session).await;
    log_view("Initial queue", &session.view());

    let initial = session.view();
    if initial.visible_queue.len() > 1 {
        let last = initial.visible_queue.len() - 1;
        let mut visual_order = initial.visible_queue.clone();
        let moved = visual_order.remove(last);
        visual_order.insert(1, moved);
        session.drag_start();
        session.drag_end(last, 1, visual_order);
        match wait_for_message(&mut receiver, |m| {
            matches!(m, Message::Queue(QueueMessage::ReorderFinished { .. }))
        })
        .await
        {
            Some(Message::Queue(QueueMessage::ReorderFinished { succeeded })) => {
                info!("Reorder finished: succeeded={}", succeeded)
            }
            _ => warn!("Reorder did not finish in time"),
        }
        info!(
            "Engine after reorder: {:?} active={:?} position={:.1}s",
            engine.queue_ids(),
            engine.active_id(),
            engine.position()
        );
        log_view("After reorder", &session.view());
    }

    if let Some(target) = session.view().visible_queue.get(1).cloned() {
        session.select_track(target.clone());
        match wait_for_message(&mut receiver, |m| {
            matches!(m, Message::Queue(QueueMessage::SelectionFinished { .. }))
        })
        .await
        {
            Some(Message::Queue(QueueMessage::SelectionFinished { track_id, succeeded })) => {
                info!("Selected {}: succeeded={}", track_id, succeeded)
            }
            _ => warn!("Selection of {} did not finish in time", target.id),
        }
        log_view("After selection", &session.view());
    }

    network.set_reachable(!fixture.reachable);
    settle(&session).await;
    log_view("After network change", &session.view());

    session.shutdown().await;

    for notice in notices.notices() {
        info!("Notice shown: {}", notice);
    }
    info!(
        "Engine calls: {} total, {} mutations",
        engine.calls().len(),
        engine.mutation_calls().len()
    );
    match serde_json::to_string_pretty(&engine.queue_ids()) {
        Ok(json) => info!("Final engine queue: {}", json),
        Err(err) => warn!("Failed to serialize final engine queue: {}", err),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Trace);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let mut args = std::env::args().skip(1);
    let config_file = match args.next().map(PathBuf::from).or_else(default_config_path) {
        Some(path) => path,
        None => return Err("no config directory available; pass a config path".into()),
    };
    let config = load_config(&config_file);
    log::set_max_level(config.logging.level.to_level_filter());
    info!("Using config {}", config_file.display());

    let fixture = match args.next() {
        Some(path) => load_fixture(Path::new(&path))?,
        None => DemoFixture::default(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    runtime.block_on(run_script(fixture, config));
    Ok(())
}
