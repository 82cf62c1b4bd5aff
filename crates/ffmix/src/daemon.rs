//! Daemon runtime: wires the surface to its two boundaries.
//!
//! Every external event funnels into one flow: mutate the surface, take the
//! resulting update batch, route the hardware-flagged updates down the
//! amixer pipe and the GUI-flagged updates to the presentation bridge. The
//! periodic work (presence probe, wake-up, control polling, meter polling)
//! runs as named scenes so a replug or a restart never leaves two copies of
//! the same loop running.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use ffmix_conf::FfmixConfig;
use ffmix_proto::{decode, FxCommand, GuiMessage, StateCommand, Value};
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alsa::HardwareBridge;
use crate::device::{build, CardSpec};
use crate::osc::{OscTransport, PresentationBridge};
use crate::params::AlsaSpec;
use crate::scenes::SceneScheduler;
use crate::snapshots::{Settings, SnapshotEntries, SnapshotStore, DEFAULT_SNAPSHOT};
use crate::surface::{FxGroup, Surface, SurfaceError, UpdateBatch};

const SCENE_STATUS: &str = "status-check";
const SCENE_WAKE_UP: &str = "wake-up";
const SCENE_POLL: &str = "poll-controls";
const SCENE_METERS: &str = "poll-meters";
const SCENE_LOADING: &str = "loading-exit";

/// Fallback model when no card is present at startup. The daemon still
/// serves the GUI offline and attaches when the card appears.
const OFFLINE_MODEL: &str = "802";

/// Shared daemon state. The surface mutex is the serialization point for
/// every mutation; the bridges do their own internal locking.
struct Ctx {
    config: FfmixConfig,
    surface: Mutex<Surface>,
    hw: HardwareBridge,
    gui: Mutex<PresentationBridge>,
    snapshots: SnapshotStore,
    scenes: SceneScheduler,
}

/// Run the daemon until the shutdown token fires.
pub async fn run(config: FfmixConfig, shutdown: CancellationToken) -> Result<()> {
    let model_name = match HardwareBridge::detect_model(&config.hardware) {
        Some(model) => model,
        None => {
            warn!("no Fireface card detected, starting offline as an {OFFLINE_MODEL}");
            OFFLINE_MODEL.to_string()
        }
    };
    let model = build(CardSpec::for_model(&model_name))
        .context("device model construction failed")?;
    let hw = HardwareBridge::new(config.hardware.clone(), model_name);
    let snapshots = SnapshotStore::new(config.paths.state_dir.clone())
        .context("state directory unavailable")?;

    let ctx = Arc::new(Ctx {
        surface: Mutex::new(Surface::new(model)),
        hw,
        gui: Mutex::new(PresentationBridge::new()),
        snapshots,
        scenes: SceneScheduler::new(),
        config,
    });

    seed_gui_cache(&ctx).await;

    // the reset target always exists
    if !ctx.snapshots.exists(DEFAULT_SNAPSHOT) {
        let entries = ctx.surface.lock().await.default_state();
        ctx.snapshots
            .save(DEFAULT_SNAPSHOT, &entries)
            .context("could not seed the default snapshot")?;
    }
    refresh_state_slots(&ctx).await;

    if ctx.config.state.autoload {
        autoload(&ctx).await;
    }

    start_status(&ctx).await;
    start_poll(&ctx).await;

    let result = gui_server(ctx.clone(), shutdown).await;

    ctx.scenes.stop_all().await;
    ctx.hw.stop().await;
    result
}

async fn autoload(ctx: &Arc<Ctx>) {
    let last = ctx.snapshots.load_settings().last_state;
    if last.is_empty() {
        return;
    }
    match ctx.snapshots.load(&last) {
        Ok(entries) => {
            info!(snapshot = %last, "autoloading last state");
            apply_entries(ctx, &entries).await;
            remember_state(ctx, &last).await;
        }
        Err(e) => warn!(snapshot = %last, error = %e, "autoload failed"),
    }
}

/// Prime the presentation cache with every GUI-routed parameter so the
/// first client's replay covers the whole surface, not just what changed
/// since startup. No client is connected yet, so nothing hits the wire.
async fn seed_gui_cache(ctx: &Arc<Ctx>) {
    let surface = ctx.surface.lock().await;
    let store = &surface.model().store;
    let mut gui = ctx.gui.lock().await;
    for id in store.priority_order() {
        let param = store.get(id);
        if !param.flags.osc {
            continue;
        }
        let Some(value) = &param.value else { continue };
        gui.push(&param.name, value, param.flags.order, id.index(), 0, 0);
    }
}

/// Mutate one parameter and route whatever it produced.
async fn set_and_route(ctx: &Arc<Ctx>, name: &str, value: Value) {
    let result = { ctx.surface.lock().await.set(name, value) };
    match result {
        Ok(batch) => route_batch(ctx, batch).await,
        Err(SurfaceError::UnknownParameter(name)) => {
            debug!(name, "ignoring write to unknown parameter");
        }
        Err(e) => warn!(name, error = %e, "parameter write rejected"),
    }
}

/// Route a finished update batch to the hardware and the GUI.
async fn route_batch(ctx: &Arc<Ctx>, batch: UpdateBatch) {
    if batch.updates.is_empty() && !batch.resync && batch.metering.is_none() {
        return;
    }

    let (out_sel, in_sel, balance, balance_spec) = {
        let surface = ctx.surface.lock().await;
        (
            scalar(&surface, "output:select"),
            scalar(&surface, "input:select"),
            surface.value("output:stereo-balance").cloned(),
            alsa_spec(&surface, "output:stereo-balance"),
        )
    };

    for update in &batch.updates {
        if !update.hardware {
            continue;
        }
        let Some(spec) = &update.alsa else { continue };
        if update.name == "output:stereo-link" {
            if let (Some(bspec), Some(bvalue)) = (&balance_spec, &balance) {
                ctx.hw
                    .send_stereo_link(
                        &update.name,
                        spec,
                        &update.value,
                        "output:stereo-balance",
                        bspec,
                        bvalue,
                    )
                    .await;
                continue;
            }
        }
        ctx.hw.send(&update.name, spec, &update.value).await;
    }

    {
        let mut gui = ctx.gui.lock().await;
        for update in &batch.updates {
            if update.osc {
                gui.push(
                    &update.name,
                    &update.value,
                    update.order,
                    update.decl,
                    out_sel,
                    in_sel,
                );
            }
        }
    }

    if batch.resync {
        resync(ctx).await;
    }
    match batch.metering {
        Some(true) => start_meters(ctx).await,
        Some(false) => ctx.scenes.stop(SCENE_METERS).await,
        None => {}
    }
}

/// Replay the full hardware-routed state after the card comes online. The
/// device boots with its own notion of every control; ours wins.
async fn resync(ctx: &Arc<Ctx>) {
    info!("card online, replaying hardware state");
    let (state, balance, balance_spec) = {
        let surface = ctx.surface.lock().await;
        (
            surface.hardware_state(),
            surface.value("output:stereo-balance").cloned(),
            alsa_spec(&surface, "output:stereo-balance"),
        )
    };
    for (name, spec, value) in &state {
        if name == "output:stereo-link" {
            if let (Some(bspec), Some(bvalue)) = (&balance_spec, &balance) {
                ctx.hw
                    .send_stereo_link(name, spec, value, "output:stereo-balance", bspec, bvalue)
                    .await;
                continue;
            }
        }
        ctx.hw.send(name, spec, value).await;
    }

    start_poll(ctx).await;
    let metering = { ctx.surface.lock().await.value("metering").is_some_and(Value::is_truthy) };
    if metering {
        start_meters(ctx).await;
    }
}

fn scalar(surface: &Surface, name: &str) -> i64 {
    surface.value(name).and_then(Value::as_int).unwrap_or(0)
}

fn alsa_spec(surface: &Surface, name: &str) -> Option<AlsaSpec> {
    surface
        .model()
        .store
        .by_name(name)
        .and_then(|p| p.flags.alsa.clone())
}

fn interval(ms: u64) -> tokio::time::Interval {
    let mut tick = tokio::time::interval(Duration::from_millis(ms));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick
}

// -- scenes -------------------------------------------------------------

async fn start_status(ctx: &Arc<Ctx>) {
    let task = ctx.clone();
    ctx.scenes
        .start(SCENE_STATUS, move |token| status_check(task, token))
        .await;
}

// `start_poll` and `start_meters` are awaited (indirectly) from within the
// scene futures they spawn, so their futures are boxed to break the
// resulting recursive opaque-type cycle.
fn start_poll(ctx: &Arc<Ctx>) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
    let task = ctx.clone();
    Box::pin(async move {
        ctx.scenes
            .start(SCENE_POLL, move |token| poll_controls(task, token))
            .await;
    })
}

fn start_meters(ctx: &Arc<Ctx>) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
    let task = ctx.clone();
    Box::pin(async move {
        ctx.scenes
            .start(SCENE_METERS, move |token| poll_meters(task, token))
            .await;
    })
}

/// Presence probe. Detects plug and unplug transitions and drives the
/// wake-up scene; `card-online` itself lives in the parameter store.
async fn status_check(ctx: Arc<Ctx>, token: CancellationToken) {
    let mut tick = interval(ctx.config.hardware.presence_interval_ms);
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tick.tick() => {}
        }

        let present = ctx.hw.probe();
        let online = { scalar(&*ctx.surface.lock().await, "card-online") == 1 };

        if present && !online {
            if ctx.scenes.is_running(SCENE_WAKE_UP).await {
                continue;
            }
            info!(model = %ctx.hw.model(), "card connected, waking up");
            ctx.hw.spawn_ctl_service();
            let task = ctx.clone();
            ctx.scenes
                .start(SCENE_WAKE_UP, move |t| wake_up(task, t))
                .await;
        } else if !present && online {
            warn!(model = %ctx.hw.model(), "card disconnected");
            ctx.hw.stop().await;
            ctx.scenes.stop(SCENE_POLL).await;
            ctx.scenes.stop(SCENE_METERS).await;
            set_and_route(&ctx, "card-online", Value::int(0)).await;
        }
    }
}

/// One-shot: wait for the ctl service to own the interface, then open the
/// write pipe and flip `card-online`, whose hook schedules the resync.
async fn wake_up(ctx: Arc<Ctx>, token: CancellationToken) {
    if !ctx.hw.wait_until_ready(&token).await {
        return;
    }
    if let Err(e) = ctx.hw.spawn_pipe().await {
        warn!(error = %e, "could not open the amixer pipe");
        return;
    }
    set_and_route(&ctx, "card-online", Value::int(1)).await;
}

/// Poll the poll-flagged controls (clock and sync status) while online.
async fn poll_controls(ctx: Arc<Ctx>, token: CancellationToken) {
    let polled: Vec<(String, AlsaSpec)> = {
        let surface = ctx.surface.lock().await;
        let store = &surface.model().store;
        store
            .ids()
            .filter_map(|id| {
                let param = store.get(id);
                if !param.flags.poll {
                    return None;
                }
                Some((param.name.clone(), param.flags.alsa.clone()?))
            })
            .collect()
    };

    let mut tick = interval(ctx.config.hardware.poll_interval_ms);
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tick.tick() => {}
        }
        if scalar(&*ctx.surface.lock().await, "card-online") != 1 {
            continue;
        }
        for (name, spec) in &polled {
            if token.is_cancelled() {
                return;
            }
            if let Some(values) = ctx.hw.query(name, spec).await {
                set_and_route(&ctx, name, Value::ints(values)).await;
            }
        }
    }
}

/// Poll the raw level meters while a client is connected. Each channel kind
/// is skipped while its whole bank is hidden in the GUI.
async fn poll_meters(ctx: Arc<Ctx>, token: CancellationToken) {
    let meters: Vec<(String, AlsaSpec, String)> = {
        let surface = ctx.surface.lock().await;
        let store = &surface.model().store;
        store
            .ids()
            .filter_map(|id| {
                let param = store.get(id);
                let rest = param.name.strip_prefix("meter:")?;
                let (kind, side) = rest.rsplit_once('-')?;
                let spec = param.flags.alsa.clone()?;
                Some((
                    param.name.clone(),
                    spec,
                    format!("{side}:{kind}-meters-visible"),
                ))
            })
            .collect()
    };

    let mut tick = interval(ctx.config.hardware.meter_interval_ms);
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tick.tick() => {}
        }
        {
            let surface = ctx.surface.lock().await;
            if scalar(&surface, "card-online") != 1 || scalar(&surface, "gui-clients") == 0 {
                continue;
            }
        }
        for (name, spec, visible) in &meters {
            if token.is_cancelled() {
                return;
            }
            let shown = {
                ctx.surface
                    .lock()
                    .await
                    .value(visible)
                    .is_some_and(Value::is_truthy)
            };
            if !shown {
                continue;
            }
            if let Some(values) = ctx.hw.query(name, spec).await {
                set_and_route(&ctx, name, Value::ints(values)).await;
            }
        }
    }
}

// -- snapshots ----------------------------------------------------------

/// Bulk-apply snapshot entries with edit hooks suspended. The loading-exit
/// scene drops the suspension once everything queued ahead of it has run.
async fn apply_entries(ctx: &Arc<Ctx>, entries: &SnapshotEntries) {
    let result = {
        let mut surface = ctx.surface.lock().await;
        surface.begin_loading();
        surface.apply_snapshot(entries)
    };
    match result {
        Ok(batch) => route_batch(ctx, batch).await,
        Err(e) => warn!(error = %e, "snapshot apply failed"),
    }

    let task = ctx.clone();
    ctx.scenes
        .start(SCENE_LOADING, move |_token| async move {
            task.surface.lock().await.finish_loading();
        })
        .await;
}

async fn remember_state(ctx: &Arc<Ctx>, name: &str) {
    set_and_route(ctx, "current-state", Value::text(name)).await;
    let settings = Settings { last_state: name.to_string() };
    if let Err(e) = ctx.snapshots.save_settings(&settings) {
        warn!(error = %e, "could not persist session settings");
    }
}

async fn refresh_state_slots(ctx: &Arc<Ctx>) {
    match ctx.snapshots.list() {
        Ok(names) => {
            set_and_route(ctx, "state-slots", Value::text(names.join("::"))).await;
        }
        Err(e) => warn!(error = %e, "could not list snapshots"),
    }
}

async fn handle_state(ctx: &Arc<Ctx>, command: StateCommand) {
    match command {
        StateCommand::Save { name, omit_defaults } => {
            let entries = { ctx.surface.lock().await.capture_state(omit_defaults) };
            if let Err(e) = ctx.snapshots.save(&name, &entries) {
                warn!(snapshot = %name, error = %e, "snapshot save failed");
                return;
            }
            remember_state(ctx, &name).await;
            refresh_state_slots(ctx).await;
            let text = format!("State '{name}' saved");
            ctx.gui.lock().await.notify("save", &text);
        }
        StateCommand::Load { name } => {
            let entries = match ctx.snapshots.load(&name) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(snapshot = %name, error = %e, "snapshot load failed");
                    return;
                }
            };
            apply_entries(ctx, &entries).await;
            remember_state(ctx, &name).await;
            let text = format!("State '{name}' loaded");
            ctx.gui.lock().await.notify("folder-open", &text);
        }
        StateCommand::Delete { name } => {
            if let Err(e) = ctx.snapshots.delete(&name) {
                warn!(snapshot = %name, error = %e, "snapshot delete failed");
                return;
            }
            if ctx.snapshots.load_settings().last_state == name {
                let _ = ctx.snapshots.save_settings(&Settings::default());
            }
            let current = {
                let surface = ctx.surface.lock().await;
                surface
                    .value("current-state")
                    .and_then(|v| v.as_str().map(String::from))
            };
            if current.as_deref() == Some(name.as_str()) {
                set_and_route(ctx, "current-state", Value::text("")).await;
            }
            refresh_state_slots(ctx).await;
            let text = format!("State '{name}' deleted");
            ctx.gui.lock().await.notify("trash", &text);
        }
        StateCommand::Reset => {
            let entries = { ctx.surface.lock().await.default_state() };
            apply_entries(ctx, &entries).await;
            set_and_route(ctx, "current-state", Value::text("")).await;
            ctx.gui.lock().await.notify("undo", "State reset");
        }
    }
}

async fn handle_fx(ctx: &Arc<Ctx>, command: FxCommand) {
    let group_name = match &command {
        FxCommand::Copy { group } | FxCommand::Paste { group } | FxCommand::Reset { group } => {
            group.clone()
        }
    };
    let Some(group) = FxGroup::parse(&group_name) else {
        warn!(group = %group_name, "unknown fx group");
        return;
    };
    match command {
        FxCommand::Copy { .. } => {
            ctx.surface.lock().await.fx_copy(group);
        }
        FxCommand::Paste { .. } => {
            let result = { ctx.surface.lock().await.fx_paste(group) };
            match result {
                Ok(batch) => route_batch(ctx, batch).await,
                Err(e) => warn!(group = %group_name, error = %e, "fx paste failed"),
            }
        }
        FxCommand::Reset { .. } => {
            let result = { ctx.surface.lock().await.fx_reset(group) };
            match result {
                Ok(batch) => route_batch(ctx, batch).await,
                Err(e) => warn!(group = %group_name, error = %e, "fx reset failed"),
            }
        }
    }
}

// -- GUI link -----------------------------------------------------------

/// Outbound half of the GUI link: datagrams aimed at the last client that
/// connected. `try_send_to` never blocks; a full socket buffer drops the
/// packet, which the replay-on-connect model tolerates.
struct UdpTransport {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl OscTransport for UdpTransport {
    fn send(&mut self, payload: &[u8]) {
        if let Err(e) = self.socket.try_send_to(payload, self.peer) {
            debug!(peer = %self.peer, error = %e, "gui send failed");
        }
    }
}

async fn gui_server(ctx: Arc<Ctx>, shutdown: CancellationToken) -> Result<()> {
    let port = ctx.config.gui.listen_port;
    let socket = Arc::new(
        UdpSocket::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("could not bind OSC port {port}"))?,
    );
    info!(port, "listening for OSC clients");

    let mut buf = vec![0u8; 65536];
    loop {
        let (len, peer) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutting down");
                return Ok(());
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "OSC receive failed");
                    continue;
                }
            },
        };
        match decode(&buf[..len]) {
            Ok(message) => handle_message(&ctx, &socket, peer, message).await,
            Err(e) => debug!(%peer, error = %e, "dropping undecodable packet"),
        }
    }
}

async fn handle_message(
    ctx: &Arc<Ctx>,
    socket: &Arc<UdpSocket>,
    peer: SocketAddr,
    message: GuiMessage,
) {
    match message {
        GuiMessage::Connect => {
            info!(%peer, "GUI client connected");
            {
                let mut gui = ctx.gui.lock().await;
                gui.set_transport(Box::new(UdpTransport { socket: socket.clone(), peer }));
            }
            set_and_route(ctx, "gui-clients", Value::int(1)).await;

            let (out_sel, in_sel, online, metering) = {
                let surface = ctx.surface.lock().await;
                (
                    scalar(&surface, "output:select"),
                    scalar(&surface, "input:select"),
                    scalar(&surface, "card-online") == 1,
                    surface.value("metering").is_some_and(Value::is_truthy),
                )
            };
            ctx.gui.lock().await.replay_all(out_sel, in_sel);
            if online && metering {
                start_meters(ctx).await;
            }
        }
        GuiMessage::Param { name, value } => {
            ctx.gui.lock().await.record_remote(&name, &value);
            set_and_route(ctx, &name, value).await;
        }
        GuiMessage::State(command) => handle_state(ctx, command).await,
        GuiMessage::Fx(command) => handle_fx(ctx, command).await,
    }
}
