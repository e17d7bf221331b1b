// Engine Module - Animation lifecycle and the shared render loop
//
// One render loop runs on its own thread at a time, paced by a fixed frame
// period. The engine owns the cancellation flag and the join handle; a new
// animation never starts before the previous loop has been joined, so the
// frame buffer and sink only ever have one writer.
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::animations::{self, Animation, Params, RuntimeContext, SetupError, Tick};
use crate::color::parse_color_spec;
use crate::geometry::GeometryStore;
use crate::sink::PixelSink;

pub const FRAME_PERIOD: Duration = Duration::from_nanos(1_000_000_000 / 30);

/// One frame handed to an animation tick. Writes go straight through to
/// the sink and into the engine's local buffer; the engine flushes with
/// show() only if at least one LED changed.
pub struct Frame<'a> {
    buffer: &'a mut [u32],
    sink: &'a mut dyn PixelSink,
    changed: bool,
}

impl<'a> Frame<'a> {
    pub(crate) fn new(buffer: &'a mut [u32], sink: &'a mut dyn PixelSink) -> Frame<'a> {
        Frame {
            buffer,
            sink,
            changed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn get(&self, index: usize) -> u32 {
        self.buffer[index]
    }

    pub fn set(&mut self, index: usize, color: u32) {
        if index < self.buffer.len() {
            self.buffer[index] = color;
            self.sink.set_pixel_color(index, color);
            self.changed = true;
        }
    }

    pub fn changed(&self) -> bool {
        self.changed
    }
}

/// Manual update for a single LED, the REST PATCH payload.
#[derive(Debug, Clone, Deserialize)]
pub struct LedUpdate {
    pub id: usize,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default = "default_true")]
    pub state: bool,
    #[serde(default = "default_brightness")]
    pub brightness: u8,
}

fn default_true() -> bool {
    true
}

fn default_brightness() -> u8 {
    255
}

#[derive(Debug, Serialize)]
pub struct EngineStatus {
    pub power: bool,
    pub animation: Option<String>,
    pub state: &'static str,
}

struct ActiveAnimation {
    name: String,
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

pub struct Engine {
    geometry: Arc<GeometryStore>,
    sink: Arc<Mutex<Box<dyn PixelSink>>>,
    snapshot: Arc<Mutex<Vec<u32>>>,
    ctx: RuntimeContext,
    active: Option<ActiveAnimation>,
    power: bool,
}

impl Engine {
    pub fn new(geometry: Arc<GeometryStore>, sink: Box<dyn PixelSink>, ctx: RuntimeContext) -> Engine {
        let led_count = geometry.len();
        Engine {
            geometry,
            sink: Arc::new(Mutex::new(sink)),
            snapshot: Arc::new(Mutex::new(vec![0; led_count])),
            ctx,
            active: None,
            power: false,
        }
    }

    pub fn geometry(&self) -> &Arc<GeometryStore> {
        &self.geometry
    }

    /// Validate and start an animation. Validation and setup run on the
    /// caller's thread and never block on the render loop; only a fully
    /// configured instance stops the previous animation and spawns.
    pub fn play(
        &mut self,
        name: &str,
        supplied: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), SetupError> {
        let descriptor = animations::descriptor(name)
            .ok_or_else(|| SetupError::UnknownAnimation(name.to_string()))?;
        let params = Params::validate(descriptor, supplied)?;
        let mut animation = animations::create(name, &self.ctx)
            .ok_or_else(|| SetupError::UnknownAnimation(name.to_string()))?;
        animation.setup(&params, &self.geometry)?;

        self.stop();
        self.spawn(name.to_string(), animation);
        Ok(())
    }

    /// Signal the running loop and join it. Bounded by one frame period:
    /// the loop checks the flag once per tick.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop.store(true, Ordering::Relaxed);
            let _ = active.handle.join();
            info!(animation = %active.name, "animation stopped");
        }
    }

    pub(crate) fn spawn(&mut self, name: String, mut animation: Box<dyn Animation>) {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let sink = Arc::clone(&self.sink);
        let snapshot = Arc::clone(&self.snapshot);
        let loop_name = name.clone();

        info!(animation = %name, "animation started");
        let handle = thread::spawn(move || {
            let mut local: Vec<u32> = snapshot.lock().unwrap().clone();
            while !stop_flag.load(Ordering::Relaxed) {
                let started = Instant::now();

                let tick = {
                    let mut guard = sink.lock().unwrap();
                    let mut frame = Frame::new(&mut local, &mut **guard);
                    let result = animation.tick(&mut frame);
                    let dirty = frame.changed();
                    drop(frame);
                    match result {
                        Ok(tick) => {
                            if dirty {
                                if let Err(e) = guard.show() {
                                    error!(animation = %loop_name, "sink failure: {:#}", e);
                                    break;
                                }
                                *snapshot.lock().unwrap() = local.clone();
                            }
                            tick
                        }
                        Err(e) => {
                            // Runtime errors are not retried; the loop dies.
                            error!(animation = %loop_name, "render loop failed: {:#}", e);
                            break;
                        }
                    }
                };

                match tick {
                    Tick::Finished => break,
                    Tick::Continue => {
                        let elapsed = started.elapsed();
                        if elapsed < FRAME_PERIOD {
                            thread::sleep(FRAME_PERIOD - elapsed);
                        }
                    }
                    Tick::Pause(duration) => {
                        // Dwell, still observing the stop flag every frame
                        let deadline = Instant::now() + duration;
                        while !stop_flag.load(Ordering::Relaxed) {
                            let now = Instant::now();
                            if now >= deadline {
                                break;
                            }
                            thread::sleep(FRAME_PERIOD.min(deadline - now));
                        }
                    }
                }
            }
        });

        self.active = Some(ActiveAnimation { name, stop, handle });
    }

    pub fn status(&self) -> EngineStatus {
        let (animation, state) = match &self.active {
            Some(active) if active.handle.is_finished() => {
                (Some(active.name.clone()), "stopped")
            }
            Some(active) => (Some(active.name.clone()), "running"),
            None => (None, "idle"),
        };
        EngineStatus {
            power: self.power,
            animation,
            state,
        }
    }

    /// Snapshot copy of the current frame buffer for API reporting. Never
    /// shares the live buffer with readers.
    pub fn snapshot(&self) -> Vec<u32> {
        self.snapshot.lock().unwrap().clone()
    }

    pub fn set_power(&mut self, on: bool) -> Result<()> {
        if !on {
            self.stop();
            self.blank()?;
        }
        self.power = on;
        info!(power = on, "power switched");
        Ok(())
    }

    pub fn power(&self) -> bool {
        self.power
    }

    /// Any manual update stops the running animation first; the caller
    /// thread becomes the frame buffer's only writer.
    pub fn update_led(&mut self, update: &LedUpdate, show: bool) -> Result<()> {
        self.stop();
        self.apply_update(update)?;
        if show {
            self.show()?;
        }
        Ok(())
    }

    pub fn update_many(&mut self, updates: &[LedUpdate], show: bool) -> Result<()> {
        self.stop();
        for update in updates {
            self.apply_update(update)?;
        }
        if show {
            self.show()?;
        }
        Ok(())
    }

    fn apply_update(&mut self, update: &LedUpdate) -> Result<()> {
        let color = if update.state {
            let spec = update
                .color
                .as_deref()
                .ok_or_else(|| anyhow!("Missing color for LED {}", update.id))?;
            parse_color_spec(spec, update.brightness)
                .ok_or_else(|| anyhow!("Invalid color: {}", spec))?
        } else {
            0
        };
        let mut sink = self.sink.lock().unwrap();
        let mut snapshot = self.snapshot.lock().unwrap();
        if update.id >= snapshot.len() {
            return Err(anyhow!("LED id {} out of range", update.id));
        }
        snapshot[update.id] = color;
        sink.set_pixel_color(update.id, color);
        Ok(())
    }

    pub fn uniform_color(&mut self, spec: &str, brightness: u8) -> Result<()> {
        self.stop();
        let color = parse_color_spec(spec, brightness)
            .ok_or_else(|| anyhow!("Invalid color: {}", spec))?;
        let mut sink = self.sink.lock().unwrap();
        let mut snapshot = self.snapshot.lock().unwrap();
        for (i, slot) in snapshot.iter_mut().enumerate() {
            *slot = color;
            sink.set_pixel_color(i, color);
        }
        sink.show()
    }

    fn blank(&mut self) -> Result<()> {
        let mut sink = self.sink.lock().unwrap();
        let mut snapshot = self.snapshot.lock().unwrap();
        for (i, slot) in snapshot.iter_mut().enumerate() {
            *slot = 0;
            sink.set_pixel_color(i, 0);
        }
        sink.show()
    }

    fn show(&mut self) -> Result<()> {
        self.sink.lock().unwrap().show()
    }

    /// The power-on chase: three primaries crawling up the strip once.
    pub fn startup(&mut self) {
        self.stop();
        self.spawn("startup".to_string(), Box::new(StartupChase::new()));
    }

    /// Block until the running animation finishes on its own. Test and
    /// startup helper; stop() is the normal path.
    pub fn join_active(&mut self) {
        if let Some(active) = self.active.take() {
            let _ = active.handle.join();
        }
    }
}

/// Power-on self test: blank, then chase red/green/blue up the strip.
struct StartupChase {
    step: usize,
}

impl StartupChase {
    fn new() -> StartupChase {
        StartupChase { step: 0 }
    }
}

const CHASE_COLORS: [u32; 3] = [0xff0000, 0x00ff00, 0x0000ff];

impl Animation for StartupChase {
    fn setup(&mut self, _params: &Params, _geometry: &GeometryStore) -> Result<(), SetupError> {
        Ok(())
    }

    fn tick(&mut self, frame: &mut Frame) -> Result<Tick> {
        let n = frame.len();
        if self.step == 0 {
            for i in 0..n {
                frame.set(i, 0);
            }
        } else if self.step <= n {
            let i = self.step - 1;
            frame.set(i, CHASE_COLORS[i % 3]);
            if i >= 3 {
                frame.set(i - 3, 0);
            }
        } else if self.step <= n + 3 {
            frame.set(self.step - 4, 0);
        } else {
            return Ok(Tick::Finished);
        }
        self.step += 1;
        Ok(Tick::Pause(Duration::from_millis(40)))
    }
}
