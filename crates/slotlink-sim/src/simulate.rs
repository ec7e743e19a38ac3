//! Lap traffic generator.
//!
//! [`RaceSimulator`] invents plausible finish line crossings for a set of
//! cars and feeds them into a [`MockControlUnit`] event queue. Lap duration
//! scales with the slot's speed setting; in fuel mode every lap burns a unit
//! of fuel and a dry tank slows the car down. The simulator runs either on a
//! background thread or stepped by hand on a manual clock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use slotlink_protocol::wire;

use crate::startlight::StartLight;
use crate::state::MockControlUnit;
use crate::Result;

const TICK: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Lap time for a car at full speed.
    pub base_lap: Duration,
    /// Controller addresses taking part, 0..=7.
    pub cars: Vec<u8>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            base_lap: Duration::from_secs(5),
            cars: vec![0, 1],
        }
    }
}

impl SimulatorConfig {
    pub fn with_base_lap(mut self, base_lap: Duration) -> Self {
        self.base_lap = base_lap;
        self
    }

    pub fn with_cars(mut self, cars: Vec<u8>) -> Self {
        self.cars = cars;
        self
    }
}

/// Generates timer events against the emulator's race clock.
pub struct RaceSimulator {
    unit: MockControlUnit,
    config: SimulatorConfig,
    next_crossing: HashMap<u8, u64>,
}

impl RaceSimulator {
    pub fn new(unit: MockControlUnit, config: SimulatorConfig) -> Self {
        Self {
            unit,
            config,
            next_crossing: HashMap::new(),
        }
    }

    /// Marks the race as running, restarts the race clock and schedules the
    /// first crossing of every moving car.
    pub fn begin(&mut self) {
        self.unit.state().start = StartLight::RaceLightsOff.value();
        self.unit.reset_race_clock();
        self.next_crossing.clear();
        let now = self.unit.race_millis();
        for (car, speed, fuel, fuel_mode) in self.snapshot() {
            if let Some(lap) = self.lap_millis(speed, fuel, fuel_mode) {
                self.next_crossing.insert(car, first_deadline(now, lap, car));
            }
        }
        debug!(cars = self.config.cars.len(), "race simulation started");
    }

    /// Emits at most one crossing per car whose deadline has passed.
    ///
    /// Deadlines live on the race clock, so stepping a manual clock forward
    /// and calling this repeatedly replays a race deterministically.
    pub fn step(&mut self) {
        let now = self.unit.race_millis();
        for (car, speed, fuel, fuel_mode) in self.snapshot() {
            let Some(lap) = self.lap_millis(speed, fuel, fuel_mode) else {
                // A stationary car forfeits its scheduled crossing.
                self.next_crossing.remove(&car);
                continue;
            };
            let deadline = *self
                .next_crossing
                .entry(car)
                .or_insert_with(|| first_deadline(now, lap, car));
            if now < deadline {
                continue;
            }
            self.unit
                .push_timer_at(car, 1, (deadline & 0xFFFF_FFFF) as u32);
            let mut remaining = fuel;
            if fuel_mode {
                let mut state = self.unit.state();
                let slot = usize::from(car);
                state.fuel[slot] = state.fuel[slot].saturating_sub(1);
                remaining = state.fuel[slot];
            }
            // The next lap length reflects the tank level after this one.
            let next_lap = self.lap_millis(speed, remaining, fuel_mode).unwrap_or(lap);
            self.next_crossing.insert(car, deadline + next_lap);
        }
    }

    fn snapshot(&self) -> Vec<(u8, u8, u8, bool)> {
        let state = self.unit.state();
        let fuel_mode = state.mode & wire::mode::FUEL != 0;
        self.config
            .cars
            .iter()
            .map(|&car| {
                let slot = usize::from(car & 0x07);
                (car & 0x07, state.speed[slot], state.fuel[slot], fuel_mode)
            })
            .collect()
    }

    /// Starts the race and ticks it on a background thread until the handle
    /// is stopped or dropped.
    pub fn start(mut self) -> Result<SimulatorHandle> {
        self.begin();
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let unit = self.unit.clone();
        let worker = thread::Builder::new()
            .name("race-sim".into())
            .spawn(move || {
                while flag.load(Ordering::SeqCst) {
                    self.step();
                    thread::sleep(TICK);
                }
            })?;
        Ok(SimulatorHandle {
            unit,
            running,
            worker: Some(worker),
        })
    }

    fn lap_millis(&self, speed: u8, fuel: u8, fuel_mode: bool) -> Option<u64> {
        if speed == 0 {
            return None;
        }
        let base = self.config.base_lap.as_millis() as f64;
        let mut factor = 1.5 - 0.5 * f64::from(speed.min(15)) / 15.0;
        if fuel_mode && fuel == 0 {
            factor *= 2.0;
        }
        Some((base * factor) as u64)
    }
}

/// Cars on higher addresses start a little further from the finish line.
fn first_deadline(now: u64, lap: u64, car: u8) -> u64 {
    now + lap + lap * u64::from(car) / 16
}

/// Owner of a running background simulation.
pub struct SimulatorHandle {
    unit: MockControlUnit,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SimulatorHandle {
    /// Stops the ticker and turns the start light off.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("race simulator thread panicked");
            }
            self.unit.state().start = StartLight::Off.value();
        }
    }
}

impl Drop for SimulatorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::startlight::SequenceConfig;
    use crate::state::TimerEvent;
    use std::time::Instant;

    fn manual_race(cars: Vec<u8>) -> (RaceSimulator, MockControlUnit, ManualClock) {
        let clock = ManualClock::new();
        let unit = MockControlUnit::with_parts(Arc::new(clock.clone()), SequenceConfig::default());
        let config = SimulatorConfig::default().with_cars(cars);
        let sim = RaceSimulator::new(unit.clone(), config);
        (sim, unit, clock)
    }

    fn drain_events(unit: &MockControlUnit) -> Vec<TimerEvent> {
        unit.state().events.drain(..).collect()
    }

    #[test]
    fn full_speed_car_crosses_after_one_base_lap() {
        let (mut sim, unit, clock) = manual_race(vec![0]);
        unit.state().speed[0] = 15;
        sim.begin();

        clock.advance(Duration::from_millis(4999));
        sim.step();
        assert!(drain_events(&unit).is_empty());

        clock.advance(Duration::from_millis(1));
        sim.step();
        assert_eq!(
            drain_events(&unit),
            vec![TimerEvent {
                address: 0,
                timestamp: 5000,
                sector: 1
            }]
        );

        // The next lap is not due yet.
        sim.step();
        assert!(drain_events(&unit).is_empty());
    }

    #[test]
    fn begin_marks_race_running_on_the_light_field() {
        let (mut sim, unit, _clock) = manual_race(vec![0]);
        sim.begin();
        assert_eq!(unit.state().start, 9);
        assert_eq!(unit.race_millis(), 0);
    }

    #[test]
    fn stationary_car_never_crosses() {
        let (mut sim, unit, clock) = manual_race(vec![0]);
        unit.state().speed[0] = 0;
        sim.begin();
        clock.advance(Duration::from_secs(60));
        sim.step();
        assert!(drain_events(&unit).is_empty());
    }

    #[test]
    fn higher_addresses_start_staggered() {
        let (mut sim, unit, clock) = manual_race(vec![0, 1]);
        {
            let mut state = unit.state();
            state.speed[0] = 15;
            state.speed[1] = 15;
        }
        sim.begin();

        clock.advance(Duration::from_millis(5000));
        sim.step();
        let first = drain_events(&unit);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].address, 0);

        clock.advance(Duration::from_millis(312));
        sim.step();
        let second = drain_events(&unit);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].address, 1);
        assert_eq!(second[0].timestamp, 5312);
    }

    #[test]
    fn fuel_mode_burns_a_unit_per_lap_and_dry_tank_slows() {
        let (mut sim, unit, clock) = manual_race(vec![0]);
        {
            let mut state = unit.state();
            state.mode = wire::mode::FUEL;
            state.speed[0] = 15;
            state.fuel[0] = 1;
        }
        sim.begin();

        clock.advance(Duration::from_millis(5000));
        sim.step();
        assert_eq!(drain_events(&unit).len(), 1);
        assert_eq!(unit.state().fuel[0], 0);

        // With the tank dry the next lap takes twice as long.
        clock.advance(Duration::from_millis(9999));
        sim.step();
        assert!(drain_events(&unit).is_empty());
        clock.advance(Duration::from_millis(1));
        sim.step();
        assert_eq!(drain_events(&unit).len(), 1);
    }

    #[test]
    fn background_run_feeds_events_until_stopped() {
        let unit = MockControlUnit::new();
        unit.state().speed[0] = 15;
        let config = SimulatorConfig::default()
            .with_base_lap(Duration::from_millis(50))
            .with_cars(vec![0]);
        let handle = RaceSimulator::new(unit.clone(), config).start().unwrap();
        assert_eq!(unit.state().start, 9);

        let deadline = Instant::now() + Duration::from_secs(5);
        while unit.state().events.is_empty() {
            assert!(Instant::now() < deadline, "no crossing was generated");
            thread::sleep(Duration::from_millis(5));
        }

        handle.stop();
        assert_eq!(unit.state().start, 0);
    }
}
