//! Per-device task and its handle
//!
//! Every controller is driven by one tokio task that owns the connection,
//! the command queue and all timers. [`LightDevice`] is a cheap handle that
//! sends intents to the task and waits until they are queued.
//!
//! Every intent except a plain status refresh pre-empts earlier work: the
//! queue is cleared and a running program stops. A write already on the wire
//! is not affected.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use wifilight_transport::protocol::timing;
use wifilight_transport::{
    connector_for, ColorModel, ConnectionManager, ConnectionState, Connector, DeviceState,
    DialTemplates, Family, FrameDecoder, Gap, LinkEvent, LinkEventKind, ProtocolSpec, Segment,
    Template, TransportError, TransportMode,
};

use crate::color::{ct_scale_to_kelvin, hsv_to_rgb, kelvin_to_rgb, rgb_to_hsv, Rgbw};
use crate::command::{LightCommand, ProgramStep};
use crate::error::DeviceError;
use crate::fade::plan_fade;
use crate::queue::{CommandQueue, QueueOptions, Step};
use crate::store::{names, StateStore};

/// Follow-up of an on-timer when none is given: fade to black over 1 s
pub const DEFAULT_ON_TIMER_FOLLOWUP: &str = "#00000000;x10";

const REQUEST_QUEUE_SIZE: usize = 32;
const STATUS_NAMES: [&str; 8] = [
    names::ON,
    names::RED,
    names::GREEN,
    names::BLUE,
    names::WHITE,
    names::PROGRAM,
    names::PROGRAM_RUNNING,
    names::PROGRAM_SPEED,
];
const PAIR_REPEAT: usize = 3;
const UNPAIR_REPEAT: usize = 15;
/// Delay before the first program step
const PROGRAM_START_DELAY: Duration = Duration::from_millis(10);

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Unique id, also the store channel (`<ip>` or `<ip>.<zone>`)
    pub id: String,
    pub host: String,
    pub port: u16,
    pub family: Family,
    pub zone: Option<u8>,
    /// `None` disables status polling
    pub poll_interval: Option<Duration>,
    pub reconnect_delay: Duration,
    /// Open a TCP connection for each write and drop it after the reply,
    /// for controllers that cannot hold a connection
    pub connect_per_write: bool,
}

impl DeviceConfig {
    /// Defaults for `family` at `host`: the family port, 30 s polling and the
    /// standard reconnect delay
    pub fn new(host: impl Into<String>, family: Family) -> Self {
        let host = host.into();
        Self {
            id: host.clone(),
            port: family.spec(None).port,
            host,
            family,
            zone: None,
            poll_interval: Some(Duration::from_secs(timing::DEFAULT_POLL_INTERVAL_S)),
            reconnect_delay: Duration::from_millis(timing::RECONNECT_DELAY_MS),
            connect_per_write: false,
        }
    }

    /// Address one zone of a zoned controller; the id becomes `<host>.<zone>`
    pub fn with_zone(mut self, zone: u8) -> Self {
        self.id = format!("{}.{}", self.host, zone);
        self.zone = Some(zone);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_poll_interval(mut self, interval: Option<Duration>) -> Self {
        self.poll_interval = interval.filter(|i| !i.is_zero());
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_connect_per_write(mut self, per_write: bool) -> Self {
        self.connect_per_write = per_write;
        self
    }

    /// Transport of the family, switched to per-write connections when asked.
    /// Datagram families are unaffected.
    pub fn mode(&self) -> TransportMode {
        match self.family.spec(self.zone).mode {
            TransportMode::Persistent if self.connect_per_write => TransportMode::PerWrite,
            mode => mode,
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// What the device task currently knows
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub id: String,
    pub family: &'static str,
    pub reachable: bool,
    #[serde(skip)]
    pub connection: ConnectionState,
    pub state: DeviceState,
    pub queued: usize,
    pub program_active: bool,
}

#[derive(Debug)]
enum Intent {
    Power(bool),
    Color { color: Rgbw, transition: u32 },
    Brightness { percent: u8, transition: u32 },
    Temperature { kelvin: u32, transition: u32 },
    SelectProgram { program: u8, speed: u8 },
    ProgramRunning(bool),
    OnTimer { delay: Duration, followup: LightCommand },
    Command(LightCommand),
    RunProgram(Vec<ProgramStep>),
    Pair,
    Unpair,
    Refresh,
}

impl Intent {
    fn preempts(&self) -> bool {
        !matches!(self, Intent::Refresh)
    }
}

enum Message {
    Intent(Intent, oneshot::Sender<Result<(), DeviceError>>),
    Snapshot(oneshot::Sender<DeviceSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running device task
#[derive(Clone)]
pub struct LightDevice {
    id: Arc<str>,
    family: Family,
    tx: mpsc::Sender<Message>,
}

impl LightDevice {
    /// Spawn the task for `config`, connecting the way its family expects
    pub fn spawn(config: DeviceConfig, store: Arc<dyn StateStore>) -> Result<Self, DeviceError> {
        let connector = connector_for(config.mode(), &config.host, config.port)?;
        Ok(Self::spawn_with_connector(config, connector, store))
    }

    /// Spawn the task on a custom connector
    pub fn spawn_with_connector(
        config: DeviceConfig,
        connector: Arc<dyn Connector>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_SIZE);
        let handle = Self {
            id: Arc::from(config.id.as_str()),
            family: config.family,
            tx,
        };
        let task = DeviceTask::new(config, connector, store);
        tokio::spawn(task.run(rx));
        handle
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn family(&self) -> Family {
        self.family
    }

    async fn request(&self, intent: Intent) -> Result<(), DeviceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Intent(intent, reply))
            .await
            .map_err(|_| DeviceError::Gone)?;
        rx.await.map_err(|_| DeviceError::Gone)?
    }

    pub async fn power_on(&self) -> Result<(), DeviceError> {
        self.request(Intent::Power(true)).await
    }

    pub async fn power_off(&self) -> Result<(), DeviceError> {
        self.request(Intent::Power(false)).await
    }

    /// Fade to `color` over `transition` tenths of a second (0 = at once)
    pub async fn set_color(&self, color: Rgbw, transition: u32) -> Result<(), DeviceError> {
        self.request(Intent::Color { color, transition }).await
    }

    /// Keep hue and saturation, set the value to `percent`
    pub async fn set_brightness(&self, percent: u8, transition: u32) -> Result<(), DeviceError> {
        self.request(Intent::Brightness { percent, transition }).await
    }

    pub async fn set_color_temperature(&self, kelvin: u32, transition: u32) -> Result<(), DeviceError> {
        self.request(Intent::Temperature { kelvin, transition }).await
    }

    /// Start built-in program `program`. Hue-dial families ignore `speed`
    /// and treat the number as disco mode steps (0 = off).
    pub async fn select_program(&self, program: u8, speed: u8) -> Result<(), DeviceError> {
        self.request(Intent::SelectProgram { program, speed }).await
    }

    pub async fn set_program_running(&self, running: bool) -> Result<(), DeviceError> {
        self.request(Intent::ProgramRunning(running)).await
    }

    /// Run `followup` once after `delay`; a zero delay cancels the timer
    pub async fn schedule_on_timer(&self, delay: Duration, followup: Option<&str>) -> Result<(), DeviceError> {
        let followup: LightCommand = followup
            .unwrap_or(DEFAULT_ON_TIMER_FOLLOWUP)
            .parse()
            .map_err(|e| {
                warn!(id = %self.id, error = %e, "invalid on-timer command");
                DeviceError::from(e)
            })?;
        self.request(Intent::OnTimer { delay, followup }).await
    }

    /// Ask the controller for its status now
    pub async fn refresh_now(&self) -> Result<(), DeviceError> {
        self.request(Intent::Refresh).await
    }

    /// Parse and run a free-text command; nothing is sent if it is malformed
    pub async fn run_command(&self, text: &str) -> Result<(), DeviceError> {
        let cmd: LightCommand = text.parse().map_err(|e| {
            warn!(id = %self.id, command = text, error = %e, "invalid command");
            DeviceError::from(e)
        })?;
        self.request(Intent::Command(cmd)).await
    }

    /// Loop through `steps` until another intent arrives or a step ends it
    pub async fn run_program(&self, steps: Vec<ProgramStep>) -> Result<(), DeviceError> {
        self.request(Intent::RunProgram(steps)).await
    }

    pub async fn pair(&self) -> Result<(), DeviceError> {
        self.request(Intent::Pair).await
    }

    pub async fn unpair(&self) -> Result<(), DeviceError> {
        self.request(Intent::Unpair).await
    }

    pub async fn state(&self) -> Result<DeviceSnapshot, DeviceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Snapshot(reply))
            .await
            .map_err(|_| DeviceError::Gone)?;
        rx.await.map_err(|_| DeviceError::Gone)
    }

    /// Stop the task and close the connection
    pub async fn shutdown(&self) -> Result<(), DeviceError> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(Message::Shutdown(done))
            .await
            .map_err(|_| DeviceError::Gone)?;
        rx.await.map_err(|_| DeviceError::Gone)
    }
}

// ============================================================================
// Task
// ============================================================================

struct ProgramRun {
    steps: Vec<ProgramStep>,
    next: usize,
    /// Target of the previous step, the next fade starts here
    last: Rgbw,
}

struct DeviceTask {
    id: String,
    zone: Option<u8>,
    spec: Arc<ProtocolSpec>,
    conn: ConnectionManager,
    link_events: mpsc::UnboundedReceiver<LinkEvent>,
    decoder: FrameDecoder,
    queue: CommandQueue,
    store: Arc<dyn StateStore>,
    state: DeviceState,
    poll_interval: Option<Duration>,
    poll_at: Option<Instant>,
    reconnect_at: Option<Instant>,
    program: Option<ProgramRun>,
    program_at: Option<Instant>,
    on_timer: Option<(Instant, LightCommand)>,
    refresh_paused: bool,
    reachable: Option<bool>,
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl DeviceTask {
    fn new(config: DeviceConfig, connector: Arc<dyn Connector>, store: Arc<dyn StateStore>) -> Self {
        let spec = Arc::new(config.family.spec(config.zone));
        let (conn, link_events) = ConnectionManager::new(connector, config.mode());
        Self {
            id: config.id,
            zone: spec.zone,
            conn: conn.with_retry_delay(config.reconnect_delay),
            link_events,
            decoder: FrameDecoder::new(spec.clone()),
            queue: CommandQueue::new(Duration::from_millis(spec.delay_ms)),
            spec,
            store,
            state: DeviceState::default(),
            poll_interval: config.poll_interval.filter(|i| !i.is_zero()),
            poll_at: None,
            reconnect_at: None,
            program: None,
            program_at: None,
            on_timer: None,
            refresh_paused: false,
            reachable: None,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Message>) {
        debug!(id = %self.id, family = %self.spec.family, "device task started");
        self.publish_reachable(false);
        self.connect().await;

        loop {
            self.drain().await;
            let queue_at = self.queue.wake_at();
            let on_timer_at = self.on_timer.as_ref().map(|(at, _)| *at);

            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(Message::Intent(intent, reply)) => {
                        let result = self.handle(intent);
                        if let Err(e) = &result {
                            warn!(id = %self.id, error = %e, "intent rejected");
                        }
                        let _ = reply.send(result);
                    }
                    Some(Message::Snapshot(reply)) => {
                        let _ = reply.send(self.snapshot());
                    }
                    Some(Message::Shutdown(done)) => {
                        self.close();
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        self.close();
                        break;
                    }
                },
                Some(event) = self.link_events.recv() => self.on_link_event(event),
                _ = sleep_until_opt(queue_at) => {}
                _ = sleep_until_opt(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.connect().await;
                }
                _ = sleep_until_opt(self.poll_at) => self.poll(),
                _ = sleep_until_opt(self.program_at) => self.program_tick(),
                _ = sleep_until_opt(on_timer_at) => self.fire_on_timer(),
            }
        }

        debug!(id = %self.id, "device task stopped");
    }

    // ---- Connection ----

    async fn connect(&mut self) {
        match self.conn.open().await {
            Ok(()) => self.on_online(),
            Err(e) => self.on_transport_error(e),
        }
    }

    fn on_online(&mut self) {
        self.reconnect_at = None;
        self.decoder.clear();
        self.publish_reachable(true);
        // A fresh link republishes the whole state
        for name in STATUS_NAMES {
            self.store.invalidate(&self.id, name);
        }
        if self.spec.has_status() {
            self.refresh();
            self.poll_at = self.poll_interval.map(|i| Instant::now() + i);
        }
    }

    fn on_transport_error(&mut self, err: TransportError) {
        self.queue.failed();
        self.reconnect_at = self.conn.fail(&err).map(|delay| Instant::now() + delay);
        if !self.conn.state().is_online() {
            self.poll_at = None;
            self.publish_reachable(false);
        }
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        match self.conn.accept(event) {
            None => {}
            Some(LinkEventKind::Data(bytes)) => {
                for state in self.decoder.push(&bytes) {
                    self.publish_state(state);
                }
            }
            Some(LinkEventKind::Closed(None)) => {
                self.decoder.clear();
                if !self.conn.state().is_online() {
                    info!(id = %self.id, "connection closed by peer");
                    self.poll_at = None;
                    self.publish_reachable(false);
                }
            }
            Some(LinkEventKind::Closed(Some(err))) => {
                self.decoder.clear();
                self.on_transport_error(err);
            }
        }
    }

    fn close(&mut self) {
        self.stop_program();
        self.queue.clear();
        self.on_timer = None;
        self.poll_at = None;
        self.reconnect_at = None;
        self.conn.close();
        self.publish_reachable(false);
    }

    // ---- Queue ----

    /// Write queued commands until the queue has to wait
    async fn drain(&mut self) {
        loop {
            match self.queue.poll(Instant::now()) {
                Step::Write(cmd) => {
                    let was_online = self.conn.state().is_online();
                    if let Err(e) = self.conn.write(&cmd.frame).await {
                        warn!(id = %self.id, error = %e, "write failed, dropping queue");
                        self.on_transport_error(e);
                        return;
                    }
                    self.queue.written(Instant::now());
                    if !was_online {
                        self.on_online();
                    }
                    if let Some(color) = cmd.applies {
                        self.apply_color(color);
                    }
                }
                Step::Idle { refresh: true } => {
                    self.refresh();
                    if self.queue.is_empty() {
                        return;
                    }
                }
                Step::Idle { .. } | Step::Wait(_) | Step::Busy => return,
            }
        }
    }

    fn enqueue(&mut self, template: &Template, args: &[u8], opts: &QueueOptions) -> Result<(), DeviceError> {
        let segments = self.spec.encode(template, args)?;
        self.queue.push(self.zone, segments, opts);
        Ok(())
    }

    /// Queue a status request unless polling is paused or the family
    /// reports no status
    fn refresh(&mut self) {
        if self.refresh_paused || self.spec.status_request.is_none() {
            return;
        }
        if let Err(e) = self.request_status() {
            warn!(id = %self.id, error = %e, "status request failed");
        }
    }

    fn request_status(&mut self) -> Result<(), DeviceError> {
        let spec = self.spec.clone();
        let template = spec.require(&spec.status_request, "status request")?;
        debug!(id = %self.id, "requesting status");
        self.enqueue(template, &[], &QueueOptions::status_request())
    }

    fn poll(&mut self) {
        self.poll_at = self.poll_interval.map(|i| Instant::now() + i);
        self.refresh();
    }

    // ---- Intents ----

    fn handle(&mut self, intent: Intent) -> Result<(), DeviceError> {
        debug!(id = %self.id, ?intent, "intent");
        if intent.preempts() {
            self.stop_program();
            self.queue.clear();
        }

        match intent {
            Intent::Power(on) => self.power(on),
            Intent::Color { color, transition } => self.fade_to(color, transition),
            Intent::Brightness { percent, transition } => self.brightness(percent, transition),
            Intent::Temperature { kelvin, transition } => self.temperature(kelvin, transition),
            Intent::SelectProgram { program, speed } => self.select_program(program, speed),
            Intent::ProgramRunning(running) => self.program_running(running),
            Intent::OnTimer { delay, followup } => {
                self.on_timer = (!delay.is_zero()).then(|| (Instant::now() + delay, followup));
                Ok(())
            }
            Intent::Command(cmd) => self.apply_command(cmd),
            Intent::RunProgram(steps) => {
                self.start_program(steps);
                Ok(())
            }
            Intent::Pair => self.pair(false),
            Intent::Unpair => self.pair(true),
            Intent::Refresh => self.request_status(),
        }
    }

    fn power(&mut self, on: bool) -> Result<(), DeviceError> {
        let spec = self.spec.clone();
        let template = if on { &spec.on } else { &spec.off };
        self.enqueue(template, &[], &QueueOptions::default())
    }

    fn fade_to(&mut self, target: Rgbw, transition: u32) -> Result<(), DeviceError> {
        let from = self.current_color();
        self.fade_between(from, target, transition)
    }

    fn fade_between(&mut self, from: Rgbw, to: Rgbw, transition: u32) -> Result<(), DeviceError> {
        let writes = self.step_writes(from).max(self.step_writes(to));
        let steps = plan_fade(from, to, transition, self.spec.delay_ms * writes);
        // Intermediate steps are pointless once the whole budget is over
        let deadline = (steps.len() > 1)
            .then(|| Instant::now() + Duration::from_millis(transition as u64 * 100));
        for step in steps {
            let opts = QueueOptions {
                delay: step.delay,
                deadline: if step.last { None } else { deadline },
                applies: Some(step.color),
                ..Default::default()
            };
            self.color(step.color, &opts)?;
        }
        Ok(())
    }

    fn color(&mut self, color: Rgbw, opts: &QueueOptions) -> Result<(), DeviceError> {
        let segments = self.color_segments(color)?;
        self.queue.push(self.zone, segments, opts);
        Ok(())
    }

    /// Frames that make the device show `color`
    fn color_segments(&self, color: Rgbw) -> Result<Vec<Segment>, DeviceError> {
        let spec = &self.spec;
        let (template, args) = match (spec.color_model, &spec.rgbw, color.white) {
            (ColorModel::HueDial, ..) => dial_color(spec, color)?,
            (ColorModel::Direct, Some(rgbw), Some(w)) => {
                (rgbw.clone(), vec![color.red, color.green, color.blue, w])
            }
            (ColorModel::Direct, ..) => {
                let rgb = spec.require(&spec.rgb, "set color")?;
                (rgb.clone(), vec![color.red, color.green, color.blue])
            }
        };
        Ok(spec.encode(&template, &args)?)
    }

    /// Delayed writes needed to show `color`
    fn step_writes(&self, color: Rgbw) -> u64 {
        self.color_segments(color)
            .map(|segments| segments.iter().filter(|s| s.gap == Gap::Timed).count())
            .unwrap_or(1)
            .max(1) as u64
    }

    fn brightness(&mut self, percent: u8, transition: u32) -> Result<(), DeviceError> {
        let spec = self.spec.clone();
        if spec.color_model == ColorModel::HueDial {
            let (level, args) = dial_level(dial_templates(&spec)?, percent);
            return self.enqueue(&spec.on.then(&level), &args, &QueueOptions::default());
        }

        let current = self.current_color();
        let mut hsv = rgb_to_hsv(current);
        hsv.value = percent.min(100);
        let target = hsv_to_rgb(hsv).with_white(current.white);
        self.fade_to(target, transition)
    }

    fn temperature(&mut self, kelvin: u32, transition: u32) -> Result<(), DeviceError> {
        let mut hsv = rgb_to_hsv(kelvin_to_rgb(kelvin));
        if let Some(v) = self.store_number(names::BRIGHTNESS).filter(|v| *v > 0) {
            hsv.value = v.min(100) as u8;
        }
        self.fade_to(hsv_to_rgb(hsv), transition)
    }

    fn select_program(&mut self, program: u8, speed: u8) -> Result<(), DeviceError> {
        let spec = self.spec.clone();
        if spec.color_model == ColorModel::HueDial {
            if program == 0 {
                return self.enqueue(&spec.off, &[], &QueueOptions::default());
            }
            let dial = dial_templates(&spec)?;
            let (level, args) = dial_level(dial, 10);
            let mut template = dial.white_mode.then_immediately(&level).then(&spec.on);
            for _ in 0..program {
                template = template.then(&dial.disco);
            }
            return self.enqueue(&template, &args, &QueueOptions::default());
        }

        let template = spec.require(&spec.program, "program select")?;
        self.enqueue(template, &[program, speed], &QueueOptions::default())
    }

    fn program_running(&mut self, running: bool) -> Result<(), DeviceError> {
        let spec = self.spec.clone();
        let template = if running {
            spec.require(&spec.program_on, "program on")?
        } else {
            spec.require(&spec.program_off, "program off")?
        };
        self.enqueue(template, &[], &QueueOptions::default())
    }

    fn pair(&mut self, unpair: bool) -> Result<(), DeviceError> {
        let spec = self.spec.clone();
        let dial = dial_templates(&spec)?;
        let (template, count, delay) = if unpair {
            (&dial.unpair, UNPAIR_REPEAT, timing::UNPAIR_DELAY_MS)
        } else {
            (&dial.pair, PAIR_REPEAT, timing::PAIR_DELAY_MS)
        };
        info!(id = %self.id, unpair, "sending pairing sequence");
        let opts = QueueOptions::with_delay(Duration::from_millis(delay));
        for _ in 0..count {
            self.enqueue(template, &[], &opts)?;
        }
        Ok(())
    }

    fn apply_command(&mut self, mut cmd: LightCommand) -> Result<(), DeviceError> {
        if let Some(steps) = cmd.program.take() {
            self.start_program(steps);
            return Ok(());
        }

        let transition = cmd
            .transition
            .unwrap_or_else(|| self.store_number(names::TRANSITION).unwrap_or(0) as u32);

        if cmd.off {
            let black = if self.spec.has_white() {
                Rgbw::rgbw(0, 0, 0, 0)
            } else {
                Rgbw::BLACK
            };
            self.color(black, &QueueOptions::default())?;
            self.apply_color(black);
        }
        if let Some(on) = cmd.on {
            self.power(on)?;
        }
        if cmd.has_color() {
            let target = cmd.color_over(self.current_color());
            self.fade_to(target, transition)?;
        }
        if let Some(ct) = cmd.ct {
            self.temperature(ct_scale_to_kelvin(ct), transition)?;
        }
        if let Some(percent) = cmd.brightness {
            self.brightness(percent, transition)?;
        }
        Ok(())
    }

    // ---- Programs and timers ----

    fn start_program(&mut self, steps: Vec<ProgramStep>) {
        if steps.is_empty() {
            self.stop_program();
            return;
        }
        info!(id = %self.id, steps = steps.len(), "starting program");
        self.refresh_paused = true;
        self.program = Some(ProgramRun {
            steps,
            next: 0,
            last: self.current_color(),
        });
        self.program_at = Some(Instant::now() + PROGRAM_START_DELAY);
    }

    fn stop_program(&mut self) {
        if self.program.take().is_some() {
            debug!(id = %self.id, "program stopped");
        }
        self.program_at = None;
        self.refresh_paused = false;
    }

    fn program_tick(&mut self) {
        self.program_at = None;
        let Some(mut run) = self.program.take() else {
            return;
        };

        // Each step waits for the previous fade to drain
        if !self.queue.is_empty() {
            let wait = Duration::from_millis(2 * self.queue.len() as u64);
            self.program_at = Some(Instant::now() + wait);
            self.program = Some(run);
            return;
        }

        let Some(step) = run.steps.get(run.next).copied() else {
            self.stop_program();
            return;
        };
        run.next = (run.next + 1) % run.steps.len();

        if let Some(color) = step.color() {
            if let Err(e) = self.fade_between(run.last, color, step.transition()) {
                warn!(id = %self.id, error = %e, "program step failed");
                self.stop_program();
                return;
            }
            run.last = color;
        }

        if step.ends_program() {
            self.stop_program();
            return;
        }
        let pause = Duration::from_millis(10 + step.transition() as u64 * 10);
        self.program_at = Some(Instant::now() + pause);
        self.program = Some(run);
    }

    fn fire_on_timer(&mut self) {
        let Some((_, cmd)) = self.on_timer.take() else {
            return;
        };
        info!(id = %self.id, "on-timer expired");
        self.stop_program();
        self.queue.clear();
        if let Err(e) = self.apply_command(cmd) {
            warn!(id = %self.id, error = %e, "on-timer command failed");
        }
    }

    // ---- State ----

    /// Color as last reported or written. Hue-dial families have no
    /// independent white channel to preserve.
    fn current_color(&self) -> Rgbw {
        let white = match self.spec.color_model {
            ColorModel::Direct => self.state.white,
            ColorModel::HueDial => None,
        };
        Rgbw {
            red: self.state.red,
            green: self.state.green,
            blue: self.state.blue,
            white,
        }
    }

    fn store_number(&self, name: &str) -> Option<u64> {
        self.store.get(&self.id, name).and_then(|v| v.as_u64())
    }

    fn publish_reachable(&mut self, reachable: bool) {
        if self.reachable == Some(reachable) {
            return;
        }
        self.reachable = Some(reachable);
        if reachable {
            info!(id = %self.id, "online");
        } else {
            info!(id = %self.id, "offline");
        }
        self.store.set(&self.id, names::REACHABLE, json!(reachable));
        self.store.update();
    }

    fn publish_state(&mut self, state: DeviceState) {
        debug!(id = %self.id, ?state, "status");
        self.state = state;
        let store = &self.store;
        let id = self.id.as_str();
        store.set(id, names::ON, json!(state.power));
        store.set(id, names::PROGRAM, json!(state.program));
        store.set(id, names::PROGRAM_RUNNING, json!(state.program_running));
        store.set(id, names::PROGRAM_SPEED, json!(state.program_speed));
        self.publish_color();
    }

    /// Optimistic update once a color command is on the wire
    fn apply_color(&mut self, color: Rgbw) {
        self.state.red = color.red;
        self.state.green = color.green;
        self.state.blue = color.blue;
        if color.white.is_some() {
            self.state.white = color.white;
        }
        self.publish_color();
    }

    fn publish_color(&self) {
        let store = &self.store;
        let id = self.id.as_str();
        store.set(id, names::RED, json!(self.state.red));
        store.set(id, names::GREEN, json!(self.state.green));
        store.set(id, names::BLUE, json!(self.state.blue));
        if let Some(w) = self.state.white {
            store.set(id, names::WHITE, json!(w));
        }
        store.set(id, names::RGB, json!(self.state.hex()));
        store.update();
    }

    fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            id: self.id.clone(),
            family: self.spec.family.name(),
            reachable: self.reachable.unwrap_or(false),
            connection: self.conn.state(),
            state: self.state,
            queued: self.queue.len(),
            program_active: self.program.is_some(),
        }
    }
}

// ============================================================================
// Hue dial helpers
// ============================================================================

fn dial_templates(spec: &ProtocolSpec) -> Result<&DialTemplates, DeviceError> {
    spec.dial
        .as_ref()
        .ok_or_else(|| DeviceError::NotSupported(format!("hue dial commands on {}", spec.family)))
}

/// Dial template and arguments showing `color`. Black and zero white
/// switch the zone off.
fn dial_color(spec: &ProtocolSpec, color: Rgbw) -> Result<(Template, Vec<u8>), DeviceError> {
    let dial = dial_templates(spec)?;

    if let Some(w) = color.white {
        let percent = (w as u32 * 100 / 255) as u8;
        if percent == 0 {
            return Ok((spec.off.clone(), Vec::new()));
        }
        let (level, args) = dial_level(dial, percent);
        return Ok((dial.white_mode.then_immediately(&level), args));
    }

    let hsv = rgb_to_hsv(color);
    if hsv.hue == 0 && hsv.value == 0 {
        return Ok((spec.off.clone(), Vec::new()));
    }
    let (level, level_args) = dial_level(dial, hsv.value);
    let mut args = vec![dial_hue(hsv.hue)];
    args.extend(level_args);
    Ok((spec.on.then(&dial.hue).then(&level), args))
}

/// Map a hue in degrees onto the dial byte; red sits at 176
fn dial_hue(hue: u16) -> u8 {
    let step = (hue as f64 / 360.0 * 255.0).floor() as i32;
    ((256 + 176 - step).rem_euclid(256)) as u8
}

/// Brightness level template for `percent`, with its arguments
fn dial_level(dial: &DialTemplates, percent: u8) -> (Template, Vec<u8>) {
    let level = (2.0 + percent.min(100) as f64 / 100.0 * dial.dim_steps as f64).floor() as u8;
    match &dial.brightness_up {
        Some(up) => {
            let mut template = up.clone();
            for _ in 1..level {
                template = template.then(up);
            }
            (template, Vec::new())
        }
        None => (dial.brightness.clone(), vec![level]),
    }
}
