//! State shared by every device driver
//!
//! [`DriverCore`] owns the pieces each family needs regardless of its
//! protocol: the transport, the profile and RGB stores, the worker group,
//! the per-port animation handles and the lifecycle state. Drivers embed
//! one and layer their wire protocol on top.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use linkhub_transport::{DeviceFamily, HidTransport};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::channel::Channel;
use crate::cluster::ClusterController;
use crate::context::Context;
use crate::error::{DriverError, Result, Status};
use crate::led::LedStore;
use crate::profile::store::ProfileStore;
use crate::profile::types::DeviceProfile;
use crate::rgb::{Animation, FrameInput, Mode, RgbStore, TempSource};
use crate::runtime::{CancelToken, RgbHandles, TaskGroup, Worker};
use crate::speed::{Controller, SpeedTarget};
use crate::temperatures;

/// Lifecycle of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceState {
    Closed,
    Opened,
    HardwareMode,
    SoftwareMode,
    Enumerated,
    Running,
    Stopping,
}

/// Temperatures sampled once per animation tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct Readings {
    pub cpu: f64,
    pub gpu: f64,
    pub liquid: f64,
}

impl Readings {
    fn input_for(&self, mode: Mode) -> FrameInput {
        let temperature = match mode {
            Mode::Temperature(TempSource::Cpu) => self.cpu,
            Mode::Temperature(TempSource::Gpu) => self.gpu,
            Mode::Temperature(TempSource::Liquid) => self.liquid,
            _ => 0.0,
        };
        FrameInput { temperature }
    }
}

/// Animations of every lit channel that share one output frame.
pub struct Scene {
    segments: Vec<Animation>,
    slider: Option<u8>,
    mode: u8,
    protection: f64,
}

impl Scene {
    pub fn new(segments: Vec<Animation>, slider: Option<u8>, mode: u8) -> Self {
        Self {
            segments,
            slider,
            mode,
            protection: 1.0,
        }
    }

    /// Extra brightness scalar applied on top of the device brightness.
    pub fn with_protection(mut self, factor: f64) -> Self {
        self.protection = factor;
        self
    }

    pub fn leds(&self) -> usize {
        self.segments.iter().map(Animation::leds).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.leds() == 0
    }

    /// True when no segment changes between ticks.
    pub fn is_static(&self) -> bool {
        self.segments.iter().all(Animation::is_static)
    }

    /// Next frame, segments concatenated in order.
    pub fn render(&mut self, readings: &Readings) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.leds() * 3);
        for anim in &mut self.segments {
            let brightness = anim.brightness(self.slider, self.mode) * self.protection;
            let input = readings.input_for(anim.mode());
            frame.extend(anim.render(&input, brightness));
        }
        frame
    }

    pub fn black(&self) -> Vec<u8> {
        vec![0u8; self.leds() * 3]
    }
}

/// Per-driver state and helpers.
pub struct DriverCore {
    pub transport: Arc<HidTransport>,
    pub ctx: Arc<Context>,
    family: DeviceFamily,
    serial: String,
    product: String,
    firmware: RwLock<String>,
    state: Mutex<DeviceState>,
    profiles: Mutex<ProfileStore>,
    rgb: Mutex<RgbStore>,
    leds: Mutex<LedStore>,
    workers: TaskGroup,
    rgb_handles: RgbHandles,
    exit: AtomicBool,
    manual_speeds: Mutex<BTreeMap<i32, u8>>,
    cluster_self: Mutex<Option<Weak<dyn ClusterController>>>,
}

impl DriverCore {
    /// Read the device strings and load the device's stores.
    pub fn new(transport: HidTransport, ctx: Arc<Context>, family: DeviceFamily) -> Result<Self> {
        let strings = transport.read_strings().map_err(|e| {
            error!("{}: unable to read device strings: {e}", transport.info().effective_serial());
            DriverError::Bootstrap(e.to_string())
        })?;
        let serial = strings
            .serial
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| transport.info().effective_serial());
        let product = strings
            .product
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| transport.info().product());

        let config = &ctx.config;
        let rgb = RgbStore::load(&config.rgb_dir(), &serial, &product)?;
        let profiles = ProfileStore::load(&config.profiles_dir(), &serial)?;
        let leds = LedStore::load(&config.led_dir(), &serial)?;
        info!("{serial}: opened {product} ({family:?})");

        Ok(Self {
            transport: Arc::new(transport),
            ctx,
            family,
            serial,
            product,
            firmware: RwLock::new(String::from("0.0.0")),
            state: Mutex::new(DeviceState::Opened),
            profiles: Mutex::new(profiles),
            rgb: Mutex::new(rgb),
            leds: Mutex::new(leds),
            workers: TaskGroup::new(),
            rgb_handles: RgbHandles::new(),
            exit: AtomicBool::new(false),
            manual_speeds: Mutex::new(BTreeMap::new()),
            cluster_self: Mutex::new(None),
        })
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn family(&self) -> DeviceFamily {
        self.family
    }

    pub fn firmware(&self) -> String {
        self.firmware.read().clone()
    }

    pub fn set_firmware(&self, firmware: String) {
        debug!("{}: firmware {firmware}", self.serial);
        self.ctx
            .metrics
            .record_device(&self.product, &self.serial, &firmware);
        *self.firmware.write() = firmware;
    }

    pub fn state(&self) -> DeviceState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: DeviceState) {
        let mut current = self.state.lock();
        if *current != state {
            debug!("{}: {:?} → {:?}", self.serial, *current, state);
            *current = state;
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.exit.load(Ordering::SeqCst)
    }

    // ── profiles ──

    /// Create the default profile on first run.
    pub fn ensure_profile<F>(&self, make: F) -> Result<()>
    where
        F: FnOnce(&str, &str) -> DeviceProfile,
    {
        let mut store = self.profiles.lock();
        store.ensure_default(|| make(&self.serial, &self.product))?;
        Ok(())
    }

    /// Read from the active profile (defaults when none is loaded).
    pub fn profile<T>(&self, f: impl FnOnce(&DeviceProfile) -> T) -> T {
        let store = self.profiles.lock();
        match store.active() {
            Some(p) => f(p),
            None => f(&DeviceProfile::new(&self.serial, &self.product)),
        }
    }

    /// Mutate the active profile and persist it.
    pub fn update_profile(&self, f: impl FnOnce(&mut DeviceProfile)) -> Status {
        let mut store = self.profiles.lock();
        let Some(profile) = store.active_mut() else {
            warn!("{}: no active profile", self.serial);
            return Status::Failure;
        };
        f(profile);
        match store.save_active() {
            Ok(()) => Status::Ok,
            Err(e) => {
                warn!("{}: unable to save profile: {e}", self.serial);
                Status::Failure
            }
        }
    }

    /// Run `f` against the profile store itself.
    pub fn with_profiles<T>(&self, f: impl FnOnce(&mut ProfileStore) -> T) -> T {
        f(&mut self.profiles.lock())
    }

    pub fn has_rgb_profile(&self, name: &str) -> bool {
        self.rgb.lock().contains(name)
    }

    pub fn with_leds<T>(&self, f: impl FnOnce(&mut LedStore) -> T) -> T {
        f(&mut self.leds.lock())
    }

    // ── lighting ──

    pub fn rgb_handles(&self) -> &RgbHandles {
        &self.rgb_handles
    }

    pub fn cluster_enabled(&self) -> bool {
        self.profile(|p| p.rgb_cluster)
    }

    /// Register the driver as its own cluster receiver.
    pub fn set_cluster_handle(&self, handle: Weak<dyn ClusterController>) {
        *self.cluster_self.lock() = Some(handle);
    }

    pub fn cluster_handle(&self) -> Option<Arc<dyn ClusterController>> {
        self.cluster_self.lock().as_ref().and_then(Weak::upgrade)
    }

    /// Animation for `channel` driving `leds` LEDs. `name` overrides the
    /// profile's RGB profile name.
    pub fn animation(&self, channel: i32, leds: usize, name: Option<&str>) -> Animation {
        let name = match name {
            Some(n) => n.to_string(),
            None => self.profile(|p| p.rgb_profile(channel).to_string()),
        };
        let (mode, profile) = self.rgb.lock().resolve(&name);
        let anim = Animation::new(mode, profile, leds);
        match mode {
            Mode::Led => {
                let colors = self.leds.lock().colors(channel, leds);
                anim.with_custom(colors)
            }
            Mode::Keyboard => {
                let colors = self.profile(|p| p.keyboard().map(|k| k.key_colors()));
                anim.with_custom(colors.unwrap_or_default())
            }
            _ => anim,
        }
    }

    /// RGB profile and resolved mode for `channel`.
    pub fn rgb_mode(&self, channel: i32) -> (String, Mode) {
        let name = self.profile(|p| p.rgb_profile(channel).to_string());
        let mode = self.rgb.lock().resolve(&name).0;
        (name, mode)
    }

    /// Scene over `lit` `(channel, leds)` pairs with the device brightness.
    pub fn scene(&self, lit: &[(i32, usize)], name: Option<&str>) -> Scene {
        let segments = lit
            .iter()
            .map(|&(channel, leds)| self.animation(channel, leds, name))
            .collect();
        let (slider, mode) = self.profile(|p| (p.brightness_slider, p.brightness));
        Scene::new(segments, slider, mode)
    }

    /// Current host temperatures plus the driver's own liquid reading.
    pub fn readings(&self, liquid: Option<f64>) -> Readings {
        let temps = &self.ctx.temperatures;
        Readings {
            cpu: temps.cpu(),
            gpu: temps.gpu(),
            liquid: liquid.unwrap_or(0.0),
        }
    }

    /// Sampler for animations that only read host temperatures.
    pub fn host_sensor(&self) -> impl Fn() -> Readings + Send + 'static {
        let temps = self.ctx.temperatures.clone();
        move || Readings {
            cpu: temps.cpu(),
            gpu: temps.gpu(),
            liquid: 0.0,
        }
    }

    /// Copy profile names and labels onto live channels.
    pub fn merge_profile(&self, channels: &mut [Channel]) {
        self.profile(|p| {
            for c in channels.iter_mut() {
                c.profile = if c.has_speed {
                    p.speed_profile(c.id).to_string()
                } else {
                    String::new()
                };
                c.rgb = if c.has_rgb() {
                    p.rgb_profile(c.id).to_string()
                } else {
                    String::new()
                };
                c.label = p.label(c.id).to_string();
            }
        });
    }

    /// Push every channel into the metrics gauges.
    pub fn record_metrics(&self, channels: &[Channel]) {
        for c in channels {
            self.ctx.metrics.record_channel(&c.sample(&self.serial));
        }
    }

    /// Frame interval, honouring the configured override.
    pub fn frame_interval(&self, default_ms: u64) -> Duration {
        let ms = self
            .ctx
            .config
            .settings
            .frame_interval_ms
            .unwrap_or(default_ms)
            .clamp(10, 1000);
        Duration::from_millis(ms)
    }

    /// Play `scene` on `port`.
    ///
    /// Any running animation on the port is stopped and blanked first.
    /// A static scene is painted once and no worker is started. `paint`
    /// returns `false` once the driver is gone, ending the loop.
    pub fn play<S, P>(&self, port: i32, mut scene: Scene, interval: Duration, sense: S, mut paint: P)
    where
        S: Fn() -> Readings + Send + 'static,
        P: FnMut(&[u8]) -> bool + Send + 'static,
    {
        if self.rgb_handles.stop(port) {
            paint(&scene.black());
        }
        if self.is_stopping() || scene.is_empty() {
            return;
        }
        if scene.is_static() {
            let frame = scene.render(&sense());
            paint(&frame);
            return;
        }
        let name = format!("{}-rgb-{port}", self.serial);
        let worker = Worker::spawn(name, move |token| loop {
            if token.is_cancelled() {
                break;
            }
            let frame = scene.render(&sense());
            if !paint(&frame) {
                break;
            }
            if token.wait(interval) {
                break;
            }
        });
        self.rgb_handles.start(port, worker);
    }

    // ── workers ──

    pub fn spawn_periodic<F>(&self, what: &str, interval: Duration, tick: F)
    where
        F: FnMut() + Send + 'static,
    {
        let name = format!("{}-{what}", self.serial);
        self.workers.add(Worker::periodic(name, interval, tick));
    }

    pub fn spawn_worker<F>(&self, what: &str, body: F)
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        let name = format!("{}-{what}", self.serial);
        self.workers.add(Worker::spawn(name, body));
    }

    pub fn live_workers(&self) -> Vec<String> {
        let mut live = self.workers.live();
        if !self.rgb_handles.is_empty() {
            live.push(format!("{}-rgb", self.serial));
        }
        live
    }

    /// Signal every worker and wait for them. Returns `false` if the
    /// driver was already stopping.
    pub fn begin_stop(&self) -> bool {
        if self.exit.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.set_state(DeviceState::Stopping);
        self.workers.shutdown();
        self.rgb_handles.stop_all();
        self.ctx.cluster.unregister(&self.serial);
        true
    }

    /// Mark the driver closed and release the handle.
    pub fn finish_stop(&self) {
        self.transport.close();
        self.set_state(DeviceState::Closed);
        info!("{}: stopped", self.serial);
    }

    // ── speed ──

    pub fn set_manual_speed(&self, channel: i32, duty: u8) {
        self.manual_speeds.lock().insert(channel, duty);
    }

    pub fn clear_manual_speed(&self, channel: i32) -> bool {
        self.manual_speeds.lock().remove(&channel).is_some()
    }

    pub fn manual_speed(&self, channel: i32) -> Option<u8> {
        self.manual_speeds.lock().get(&channel).copied()
    }

    /// Evaluate the controller over `(channel, is_pump)` pairs.
    ///
    /// Nothing is emitted while the controller is disabled. Channels
    /// under a manual override are skipped. `force` replaces every
    /// channel's speed profile.
    pub fn speed_targets(
        &self,
        controller: &mut Controller,
        channels: &[(i32, bool)],
        liquid: Option<f64>,
        force: Option<&str>,
    ) -> Vec<SpeedTarget> {
        if self.ctx.manual() {
            return Vec::new();
        }
        controller.set_graph(self.ctx.graph_profiles());
        let names: Vec<(i32, bool, String)> = self.profile(|p| {
            channels
                .iter()
                .map(|&(id, pump)| {
                    let name = force.map_or_else(|| p.speed_profile(id).to_string(), str::to_string);
                    (id, pump, name)
                })
                .collect()
        });
        let speeds = self.ctx.speeds.read();
        let mut targets = Vec::new();
        for (id, is_pump, name) in names {
            if self.manual_speed(id).is_some() {
                continue;
            }
            let (name, profile) = speeds.resolve(&name);
            let temp = temperatures::resolve(
                self.ctx.temperatures.as_ref(),
                profile.sensor,
                &profile.sensor_id,
                liquid,
            );
            if let Some(target) = controller.evaluate(&name, &profile, id, is_pump, temp) {
                debug!(
                    "{}: channel {id} → {}% ({name} @ {temp:.1}°C)",
                    self.serial, target.duty
                );
                targets.push(target);
            }
        }
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::rgb::RgbProfile;

    fn solid(leds: usize, color: Color) -> Animation {
        Animation::new(
            Mode::Static,
            RgbProfile {
                start_color: color,
                ..Default::default()
            },
            leds,
        )
    }

    #[test]
    fn test_scene_concatenates_segments() {
        let mut scene = Scene::new(
            vec![solid(1, Color::from_bytes(255, 0, 0)), solid(2, Color::WHITE)],
            None,
            0,
        );
        assert!(scene.is_static());
        assert_eq!(scene.leds(), 3);
        let frame = scene.render(&Readings::default());
        assert_eq!(frame, vec![255, 0, 0, 255, 255, 255, 255, 255, 255]);
    }

    #[test]
    fn test_scene_slider_and_protection() {
        let mut scene = Scene::new(vec![solid(1, Color::WHITE)], Some(50), 0).with_protection(0.5);
        assert_eq!(scene.render(&Readings::default()), vec![64, 64, 64]);
    }

    #[test]
    fn test_readings_pick_sensor() {
        let r = Readings {
            cpu: 40.0,
            gpu: 55.0,
            liquid: 31.0,
        };
        assert_eq!(r.input_for(Mode::Temperature(TempSource::Gpu)).temperature, 55.0);
        assert_eq!(r.input_for(Mode::Temperature(TempSource::Liquid)).temperature, 31.0);
        assert_eq!(r.input_for(Mode::Rainbow).temperature, 0.0);
    }
}
