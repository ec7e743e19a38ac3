//! Start light countdown state machine.
//!
//! The control unit panel steps through five red phases, all-red, green and
//! into the running race on a fixed interval timer. [`StartLightSequence`]
//! reproduces that behavior standalone so the emulator and tests can drive
//! it without hardware.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::warn;

/// One position of the start light panel.
///
/// Values match the start-light field reported in status frames. The panel
/// advances monotonically from [`Off`](Self::Off) through the red phases to
/// [`Race`](Self::Race) and goes dark one step later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum StartLight {
    Off = 0,
    Red1 = 1,
    Red2 = 2,
    Red3 = 3,
    Red4 = 4,
    Red5 = 5,
    RedAll = 6,
    Green = 7,
    Race = 8,
    RaceLightsOff = 9,
}

impl StartLight {
    /// Wire value of this position, as carried in status frames.
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn from_value(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Off,
            1 => Self::Red1,
            2 => Self::Red2,
            3 => Self::Red3,
            4 => Self::Red4,
            5 => Self::Red5,
            6 => Self::RedAll,
            7 => Self::Green,
            8 => Self::Race,
            9 => Self::RaceLightsOff,
            _ => return None,
        })
    }

    /// True for the red phases before the lights go green.
    pub fn is_countdown(self) -> bool {
        matches!(
            self,
            Self::Red1 | Self::Red2 | Self::Red3 | Self::Red4 | Self::Red5 | Self::RedAll
        )
    }

    /// True once the race is underway, whether or not the panel still shows it.
    pub fn is_racing(self) -> bool {
        matches!(self, Self::Green | Self::Race | Self::RaceLightsOff)
    }

    fn next(self) -> Option<Self> {
        Some(match self {
            Self::Off | Self::RaceLightsOff => return None,
            Self::Red1 => Self::Red2,
            Self::Red2 => Self::Red3,
            Self::Red3 => Self::Red4,
            Self::Red4 => Self::Red5,
            Self::Red5 => Self::RedAll,
            Self::RedAll => Self::Green,
            Self::Green => Self::Race,
            Self::Race => Self::RaceLightsOff,
        })
    }
}

impl fmt::Display for StartLight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Off => "off",
            Self::Red1 => "red 1",
            Self::Red2 => "red 2",
            Self::Red3 => "red 3",
            Self::Red4 => "red 4",
            Self::Red5 => "red 5",
            Self::RedAll => "all red",
            Self::Green => "green",
            Self::Race => "race",
            Self::RaceLightsOff => "race (lights off)",
        };
        f.write_str(name)
    }
}

/// Timing knobs for [`StartLightSequence`].
///
/// The control unit steps every second; tests shrink the intervals to keep
/// countdown coverage fast.
#[derive(Debug, Clone, Copy)]
pub struct SequenceConfig {
    /// Hold time for each red phase, and for [`StartLight::Race`] before the
    /// panel goes dark.
    pub step_interval: Duration,
    /// Hold time for [`StartLight::Green`] before the race counts as started.
    pub green_duration: Duration,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            step_interval: Duration::from_secs(1),
            green_duration: Duration::from_secs(1),
        }
    }
}

impl SequenceConfig {
    pub fn with_step_interval(mut self, step_interval: Duration) -> Self {
        self.step_interval = step_interval;
        self
    }

    pub fn with_green_duration(mut self, green_duration: Duration) -> Self {
        self.green_duration = green_duration;
        self
    }
}

type StateHook = dyn Fn(StartLight) + Send + Sync;

struct SequenceState {
    light: StartLight,
    /// Bumped on every external transition; a driver thread whose generation
    /// no longer matches must exit without touching the light.
    generation: u64,
    /// Set by [`StartLightSequence::pause`] so the next start skips the
    /// countdown and re-enters the race directly.
    resume_armed: bool,
}

struct Shared {
    state: Mutex<SequenceState>,
    cond: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SequenceState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }
}

/// Timer-driven countdown machine.
///
/// At most one countdown runs at a time; a dedicated driver thread advances
/// the light on the configured interval while [`cancel`](Self::cancel),
/// [`pause`](Self::pause) and [`start`](Self::start) apply their transitions
/// under the same lock.
pub struct StartLightSequence {
    shared: Arc<Shared>,
    config: SequenceConfig,
    hook: Option<Arc<StateHook>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl StartLightSequence {
    pub fn new(config: SequenceConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SequenceState {
                    light: StartLight::Off,
                    generation: 0,
                    resume_armed: false,
                }),
                cond: Condvar::new(),
            }),
            config,
            hook: None,
            driver: Mutex::new(None),
        }
    }

    /// Installs an observer invoked outside the state lock after every
    /// transition, including the ones made by the driver thread.
    pub fn with_hook(mut self, hook: impl Fn(StartLight) + Send + Sync + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Current panel position.
    pub fn light(&self) -> StartLight {
        self.shared.lock().light
    }

    /// Begins the countdown, or re-enters the race directly after a pause.
    ///
    /// Returns false without effect while a countdown or race is already in
    /// progress.
    pub fn start(&self) -> bool {
        let entered;
        let fresh_generation;
        {
            let mut state = self.shared.lock();
            if state.light != StartLight::Off {
                return false;
            }
            if state.resume_armed {
                state.resume_armed = false;
                state.light = StartLight::Race;
                entered = StartLight::Race;
                fresh_generation = None;
            } else {
                state.generation += 1;
                state.light = StartLight::Red1;
                entered = StartLight::Red1;
                fresh_generation = Some(state.generation);
            }
        }
        fire(&self.hook, entered);
        if let Some(generation) = fresh_generation {
            self.spawn_driver(generation);
        }
        true
    }

    /// Aborts a countdown in progress and returns the panel to off.
    ///
    /// Only the red phases can be cancelled; returns false otherwise.
    pub fn cancel(&self) -> bool {
        {
            let mut state = self.shared.lock();
            if !state.light.is_countdown() {
                return false;
            }
            state.light = StartLight::Off;
            state.resume_armed = false;
            state.generation += 1;
        }
        self.shared.cond.notify_all();
        fire(&self.hook, StartLight::Off);
        true
    }

    /// Suspends a running race and arms the next [`start`](Self::start) to
    /// resume it without a new countdown.
    ///
    /// Returns false unless the race is underway.
    pub fn pause(&self) -> bool {
        {
            let mut state = self.shared.lock();
            if !state.light.is_racing() {
                return false;
            }
            state.light = StartLight::Off;
            state.resume_armed = true;
            state.generation += 1;
        }
        self.shared.cond.notify_all();
        fire(&self.hook, StartLight::Off);
        true
    }

    /// Detaches the driver thread and waits for it to exit. The light keeps
    /// its last value.
    pub fn stop(&self) {
        {
            let mut state = self.shared.lock();
            state.generation += 1;
        }
        self.shared.cond.notify_all();
        let handle = self
            .driver
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("start light driver panicked");
            }
        }
    }

    fn spawn_driver(&self, generation: u64) {
        let shared = Arc::clone(&self.shared);
        let config = self.config;
        let hook = self.hook.clone();
        let spawned = thread::Builder::new()
            .name("startlight".into())
            .spawn(move || drive(shared, config, hook, generation));
        match spawned {
            Ok(handle) => {
                // A previous driver has already observed its stale generation
                // and exited; its handle can simply be dropped.
                let mut slot = self.driver.lock().unwrap_or_else(|err| err.into_inner());
                *slot = Some(handle);
            }
            Err(err) => warn!(%err, "failed to spawn start light driver"),
        }
    }
}

impl Drop for StartLightSequence {
    fn drop(&mut self) {
        self.stop();
    }
}

fn fire(hook: &Option<Arc<StateHook>>, light: StartLight) {
    if let Some(hook) = hook {
        hook(light);
    }
}

fn drive(
    shared: Arc<Shared>,
    config: SequenceConfig,
    hook: Option<Arc<StateHook>>,
    generation: u64,
) {
    loop {
        let state = shared.lock();
        if state.generation != generation || state.light.next().is_none() {
            return;
        }
        let hold = match state.light {
            StartLight::Green => config.green_duration,
            _ => config.step_interval,
        };
        let (mut state, wait) = shared
            .cond
            .wait_timeout_while(state, hold, |state| state.generation == generation)
            .unwrap_or_else(|err| err.into_inner());
        if !wait.timed_out() {
            return;
        }
        let next = match state.light.next() {
            Some(next) => next,
            None => return,
        };
        state.light = next;
        drop(state);
        fire(&hook, next);
    }
}
