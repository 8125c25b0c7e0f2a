//! Device task behaviour on a recording connector with a paused clock

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

use wifilight_device::{
    names, plan_fade, DeviceConfig, DeviceError, LightDevice, MemoryStore, Rgbw, StateStore,
};
use wifilight_transport::{Connector, Family, FrameSink, LinkEvent, LinkEventKind, TransportError};

const STATUS_REQUEST: [u8; 4] = [0x81, 0x8a, 0x8b, 0x96];
const POWER_ON: [u8; 4] = [0x71, 0x23, 0x0f, 0xa3];
const POWER_OFF: [u8; 4] = [0x71, 0x24, 0x0f, 0xa4];

#[derive(Default)]
struct Wire {
    connects: Vec<Instant>,
    writes: Vec<(Instant, Vec<u8>)>,
    /// Number of leading connect attempts reset by the peer
    resets: usize,
    /// Refuse every connect attempt
    refuse: bool,
    link: Option<(u64, mpsc::UnboundedSender<LinkEvent>)>,
}

impl Wire {
    fn frames(&self) -> Vec<Vec<u8>> {
        self.writes.iter().map(|(_, f)| f.clone()).collect()
    }

    /// Push bytes into the current link as if the controller sent them
    fn inject(&self, bytes: &[u8]) {
        let (link, events) = self.link.as_ref().expect("no open link");
        events
            .send(LinkEvent {
                link: *link,
                kind: LinkEventKind::Data(bytes.to_vec()),
            })
            .unwrap();
    }
}

struct RecordingConnector(Arc<Mutex<Wire>>);

struct RecordingSink(Arc<Mutex<Wire>>);

#[async_trait]
impl FrameSink for RecordingSink {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.0.lock().writes.push((Instant::now(), frame.to_vec()));
        Ok(())
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    async fn connect(
        &self,
        link: u64,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Box<dyn FrameSink>, TransportError> {
        let mut wire = self.0.lock();
        wire.connects.push(Instant::now());
        if wire.refuse {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused).into());
        }
        if wire.connects.len() <= wire.resets {
            return Err(io::Error::from(io::ErrorKind::ConnectionReset).into());
        }
        wire.link = Some((link, events));
        Ok(Box::new(RecordingSink(self.0.clone())))
    }

    fn describe(&self) -> String {
        "recording".into()
    }
}

struct Harness {
    device: LightDevice,
    wire: Arc<Mutex<Wire>>,
    store: Arc<MemoryStore>,
}

fn start(config: DeviceConfig, resets: usize) -> Harness {
    start_on(
        config,
        Wire {
            resets,
            ..Default::default()
        },
    )
}

fn start_on(config: DeviceConfig, wire: Wire) -> Harness {
    let wire = Arc::new(Mutex::new(wire));
    let store = Arc::new(MemoryStore::new());
    let device = LightDevice::spawn_with_connector(
        config,
        Arc::new(RecordingConnector(wire.clone())),
        store.clone(),
    );
    Harness {
        device,
        wire,
        store,
    }
}

fn ld382a() -> DeviceConfig {
    DeviceConfig::new("10.0.0.2", Family::Ld382a).with_poll_interval(None)
}

fn is_color(frame: &[u8]) -> bool {
    frame.first() == Some(&0x31)
}

#[tokio::test(start_paused = true)]
async fn test_commands_are_written_in_order() {
    let h = start(ld382a(), 0);
    h.device.power_on().await.unwrap();
    sleep(Duration::from_millis(50)).await;
    h.device.select_program(37, 5).await.unwrap();
    sleep(Duration::from_secs(1)).await;

    let wire = h.wire.lock();
    assert_eq!(
        wire.frames(),
        vec![
            STATUS_REQUEST.to_vec(),
            POWER_ON.to_vec(),
            STATUS_REQUEST.to_vec(),
            vec![0x61, 37, 5, 0x0f, 0x9a],
            STATUS_REQUEST.to_vec(),
        ]
    );
    // Never faster than the family delay
    for pair in wire.writes.windows(2) {
        assert!(pair[1].0 - pair[0].0 >= Duration::from_millis(10));
    }
}

#[tokio::test(start_paused = true)]
async fn test_new_intent_preempts_fade() {
    let h = start(ld382a(), 0);
    h.device.set_color(Rgbw::rgb(255, 0, 0), 10).await.unwrap();
    sleep(Duration::from_millis(305)).await;
    h.device.power_off().await.unwrap();
    sleep(Duration::from_secs(2)).await;

    let frames = h.wire.lock().frames();
    let off = frames.iter().position(|f| f[..] == POWER_OFF).unwrap();
    let fade_steps = frames.iter().filter(|f| is_color(f)).count();
    assert!((20..=40).contains(&fade_steps), "{} fade steps", fade_steps);
    assert!(frames[off..].iter().all(|f| !is_color(f)));

    let snapshot = h.device.state().await.unwrap();
    assert!(snapshot.state.red > 0 && snapshot.state.red < 255);
    assert_eq!(snapshot.queued, 0);
}

#[tokio::test(start_paused = true)]
async fn test_fade_completes_on_target() {
    let h = start(ld382a(), 0);
    h.device.set_color(Rgbw::rgb(0, 0, 200), 5).await.unwrap();
    sleep(Duration::from_secs(2)).await;

    let frames = h.wire.lock().frames();
    let colors: Vec<_> = frames.iter().filter(|f| is_color(f)).collect();
    assert!((45..=50).contains(&colors.len()), "{} steps", colors.len());
    assert_eq!(colors[colors.len() - 1][..4], [0x31, 0, 0, 200]);
    assert_eq!(h.store.get("10.0.0.2", names::BLUE), Some(json!(200)));
    assert_eq!(h.store.get("10.0.0.2", names::RGB), Some(json!("#0000c8")));
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_retry_delay() {
    let h = start(ld382a(), 1);
    sleep(Duration::from_millis(4900)).await;
    assert_eq!(h.wire.lock().connects.len(), 1);
    assert_eq!(h.store.get("10.0.0.2", names::REACHABLE), Some(json!(false)));

    sleep(Duration::from_millis(200)).await;
    let wire = h.wire.lock();
    assert_eq!(wire.connects.len(), 2);
    assert!(wire.connects[1] - wire.connects[0] >= Duration::from_secs(5));
    assert_eq!(h.store.get("10.0.0.2", names::REACHABLE), Some(json!(true)));
}

#[tokio::test(start_paused = true)]
async fn test_refused_connection_stays_offline() {
    let h = start_on(
        ld382a(),
        Wire {
            refuse: true,
            ..Default::default()
        },
    );
    sleep(Duration::from_secs(10)).await;
    assert_eq!(h.wire.lock().connects.len(), 1);
    assert_eq!(h.store.get("10.0.0.2", names::REACHABLE), Some(json!(false)));
    assert!(!h.device.state().await.unwrap().reachable);

    // Only a write tries again
    h.device.power_on().await.unwrap();
    sleep(Duration::from_secs(10)).await;
    assert_eq!(h.wire.lock().connects.len(), 2);
    assert!(h.wire.lock().writes.is_empty());
    assert_eq!(h.store.get("10.0.0.2", names::REACHABLE), Some(json!(false)));
}

#[tokio::test(start_paused = true)]
async fn test_connect_per_write_reconnects_after_reply() {
    let h = start(ld382a().with_connect_per_write(true), 0);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(h.wire.lock().connects.len(), 1);
    assert_eq!(h.wire.lock().frames(), vec![STATUS_REQUEST.to_vec()]);

    // The reply ends the link
    let status = [0x81, 0x04, 0x23, 0x61, 0x21, 0x05, 1, 2, 3, 4, 0x03, 0, 0, 0];
    h.wire.lock().inject(&status);
    sleep(Duration::from_millis(10)).await;
    assert_eq!(h.store.get("10.0.0.2", names::ON), Some(json!(true)));

    h.device.power_off().await.unwrap();
    sleep(Duration::from_millis(50)).await;
    let wire = h.wire.lock();
    assert_eq!(wire.connects.len(), 2);
    assert_eq!(
        wire.frames()[1..].to_vec(),
        vec![POWER_OFF.to_vec(), STATUS_REQUEST.to_vec()]
    );
    drop(wire);
    assert_eq!(h.store.get("10.0.0.2", names::REACHABLE), Some(json!(true)));
}

#[tokio::test(start_paused = true)]
async fn test_status_frames_update_store() {
    let h = start(ld382a(), 0);
    sleep(Duration::from_millis(50)).await;

    // Split across two reads
    let status = [0x81, 0x04, 0x23, 0x61, 0x21, 0x05, 1, 2, 3, 4, 0x03, 0, 0, 0];
    h.wire.lock().inject(&status[..5]);
    h.wire.lock().inject(&status[5..]);
    sleep(Duration::from_millis(10)).await;

    let snapshot = h.device.state().await.unwrap();
    assert!(snapshot.reachable);
    assert!(snapshot.state.power);
    assert_eq!(snapshot.state.white, Some(4));

    let id = "10.0.0.2";
    assert_eq!(h.store.get(id, names::ON), Some(json!(true)));
    assert_eq!(h.store.get(id, names::PROGRAM), Some(json!(0x61)));
    assert_eq!(h.store.get(id, names::PROGRAM_RUNNING), Some(json!(true)));
    assert_eq!(h.store.get(id, names::RGB), Some(json!("#01020304")));
}

#[tokio::test(start_paused = true)]
async fn test_periodic_status_poll() {
    let config = ld382a().with_poll_interval(Some(Duration::from_secs(30)));
    let h = start(config, 0);
    sleep(Duration::from_secs(95)).await;

    let requests = h
        .wire
        .lock()
        .frames()
        .iter()
        .filter(|f| f[..] == STATUS_REQUEST)
        .count();
    // One on connect plus one every 30 s
    assert_eq!(requests, 4);
}

#[tokio::test(start_paused = true)]
async fn test_on_timer_fades_to_black() {
    let h = start(ld382a(), 0);
    h.device.set_color(Rgbw::rgb(10, 10, 10), 0).await.unwrap();
    sleep(Duration::from_millis(100)).await;
    h.device
        .schedule_on_timer(Duration::from_secs(2), None)
        .await
        .unwrap();
    sleep(Duration::from_millis(1900)).await;
    let before = h.wire.lock().frames().iter().filter(|f| is_color(f)).count();
    assert_eq!(before, 1);

    sleep(Duration::from_secs(2)).await;
    let frames = h.wire.lock().frames();
    let colors: Vec<_> = frames.iter().filter(|f| is_color(f)).collect();
    assert_eq!(colors.len(), 11);
    assert_eq!(colors[10], &vec![0x31, 0, 0, 0, 0, 0x00, 0x0f, 0x40]);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_command_sends_nothing() {
    let h = start(ld382a(), 0);
    sleep(Duration::from_millis(50)).await;
    let err = h.device.run_command("foo:1").await.unwrap_err();
    assert!(matches!(err, DeviceError::Parse(_)));
    sleep(Duration::from_millis(50)).await;
    assert_eq!(h.wire.lock().frames(), vec![STATUS_REQUEST.to_vec()]);
}

#[tokio::test(start_paused = true)]
async fn test_free_text_color_command() {
    let h = start(ld382a(), 0);
    h.device.run_command("r:40, g:20, b:0").await.unwrap();
    sleep(Duration::from_millis(100)).await;

    let frames = h.wire.lock().frames();
    let colors: Vec<_> = frames.iter().filter(|f| is_color(f)).collect();
    assert_eq!(colors.len(), 1);
    assert_eq!(colors[0][..5], [0x31, 40, 20, 0, 0xff]);
}

#[tokio::test(start_paused = true)]
async fn test_program_playback_stops_on_negative_step() {
    let h = start(ld382a(), 0);
    h.device
        .run_command("p:[{r:100,g:0,b:0,x:1},{r:0,g:100,b:0,x:-1}]")
        .await
        .unwrap();
    sleep(Duration::from_millis(50)).await;
    assert!(h.device.state().await.unwrap().program_active);

    sleep(Duration::from_secs(2)).await;
    let snapshot = h.device.state().await.unwrap();
    assert!(!snapshot.program_active);
    assert_eq!(
        (snapshot.state.red, snapshot.state.green),
        (0, 100)
    );
}

#[tokio::test(start_paused = true)]
async fn test_pairing_needs_dial_family() {
    let h = start(ld382a(), 0);
    assert!(matches!(
        h.device.pair().await,
        Err(DeviceError::NotSupported(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_milight_zone_brightness() {
    let config = DeviceConfig::new("10.0.0.3", Family::MiLight).with_zone(2);
    let h = start(config, 0);
    h.device.set_brightness(100, 0).await.unwrap();
    sleep(Duration::from_millis(500)).await;

    let wire = h.wire.lock();
    assert_eq!(
        wire.frames(),
        vec![vec![0x47, 0x00, 0x55], vec![0x4e, 27, 0x55]]
    );
    assert!(wire.writes[1].0 - wire.writes[0].0 >= Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_milight_fade_writes_every_step() {
    let config = DeviceConfig::new("10.0.0.3", Family::MiLight).with_zone(1);
    let h = start(config, 0);
    let target = Rgbw::rgb(255, 0, 0);
    // On, hue and level for each step, 100 ms apart
    let planned = plan_fade(Rgbw::BLACK, target, 10, 300).len();
    assert!(planned > 1);

    h.device.set_color(target, 10).await.unwrap();
    sleep(Duration::from_secs(2)).await;

    let wire = h.wire.lock();
    assert_eq!(wire.writes.len(), 3 * planned);
    let levels: Vec<_> = wire.writes.iter().filter(|(_, f)| f[0] == 0x4e).collect();
    assert_eq!(levels.len(), planned);
    assert!(levels.windows(2).all(|p| p[0].1[1] < p[1].1[1]));
    assert_eq!(levels[planned - 1].1, vec![0x4e, 27, 0x55]);
    assert!(levels[planned - 1].0 - wire.writes[0].0 <= Duration::from_secs(1));
    for pair in wire.writes.windows(2) {
        assert!(pair[1].0 - pair[0].0 >= Duration::from_millis(100));
    }
}

#[tokio::test(start_paused = true)]
async fn test_milight_pairing_sequence() {
    let config = DeviceConfig::new("10.0.0.3", Family::MiLight).with_zone(1);
    let h = start(config, 0);
    h.device.pair().await.unwrap();
    sleep(Duration::from_secs(4)).await;

    let wire = h.wire.lock();
    assert_eq!(wire.frames(), vec![vec![0x25, 0x00, 0x55]; 3]);
    assert!(wire.writes[1].0 - wire.writes[0].0 >= Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_handle() {
    let h = start(ld382a(), 0);
    h.device.shutdown().await.unwrap();
    assert!(matches!(h.device.power_on().await, Err(DeviceError::Gone)));
    assert_eq!(h.store.get("10.0.0.2", names::REACHABLE), Some(json!(false)));
}
