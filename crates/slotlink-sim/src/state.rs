//! Emulated control unit.
//!
//! [`MockControlUnit`] answers the same request payloads a physical unit
//! does, backed by a plain [`CuState`] snapshot that tests and the race
//! simulator mutate directly. Clones share one state, one start light
//! sequence and one race clock, so a TCP server can serve many clients
//! against a single emulated track.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tracing::{debug, trace, warn};

use slotlink_protocol::wire::{self, button, word};
use slotlink_protocol::{PayloadReader, PayloadWriter};

use crate::clock::{Clock, MonotonicClock};
use crate::startlight::{SequenceConfig, StartLight, StartLightSequence};

/// A queued sector crossing, reported by the next poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    /// Controller address, 0..=7.
    pub address: u8,
    /// Race clock milliseconds, wrapping at 2^32.
    pub timestamp: u32,
    /// 1 is the finish line, 2 and 3 are check lanes.
    pub sector: u8,
}

/// Mutable track state behind the emulator.
#[derive(Debug, Clone)]
pub struct CuState {
    pub fuel: [u8; 8],
    pub speed: [u8; 8],
    pub brake: [u8; 8],
    pub position: [u8; 8],
    pub start: u8,
    pub mode: u8,
    pub pit: [bool; 8],
    pub display: u8,
    pub lap_high: u8,
    pub lap_low: u8,
    pub ignore_mask: u8,
    pub version: String,
    base: u64,
    origin: Option<u64>,
    pub(crate) events: VecDeque<TimerEvent>,
}

impl Default for CuState {
    fn default() -> Self {
        Self {
            fuel: [15; 8],
            speed: [8; 8],
            brake: [8; 8],
            position: [0; 8],
            start: 0,
            mode: 0,
            pit: [false; 8],
            display: 8,
            lap_high: 0,
            lap_low: 0,
            ignore_mask: 0,
            version: "5337".to_owned(),
            base: 0,
            origin: None,
            events: VecDeque::new(),
        }
    }
}

impl CuState {
    /// Restarts the race clock at zero from `now`.
    pub fn reset_timer(&mut self, now: u64) {
        self.base = 0;
        self.origin = Some(now);
    }

    /// Milliseconds on the race clock at `now`.
    pub fn race_millis(&self, now: u64) -> u64 {
        match self.origin {
            Some(origin) => self.base + now.saturating_sub(origin),
            None => self.base,
        }
    }

    fn pit_mask(&self) -> u8 {
        self.pit
            .iter()
            .enumerate()
            .fold(0, |mask, (slot, &in_pit)| {
                if in_pit {
                    mask | 1 << slot
                } else {
                    mask
                }
            })
    }
}

/// In-process stand-in for a physical control unit.
#[derive(Clone)]
pub struct MockControlUnit {
    state: Arc<Mutex<CuState>>,
    sequence: Arc<StartLightSequence>,
    clock: Arc<dyn Clock>,
}

impl MockControlUnit {
    pub fn new() -> Self {
        Self::with_parts(Arc::new(MonotonicClock::new()), SequenceConfig::default())
    }

    /// Builds a unit on an injected clock and start light timing, used by
    /// tests to step time by hand.
    pub fn with_parts(clock: Arc<dyn Clock>, sequence_config: SequenceConfig) -> Self {
        let state = Arc::new(Mutex::new(CuState::default()));
        let hook_state = Arc::clone(&state);
        let hook_clock = Arc::clone(&clock);
        let sequence = StartLightSequence::new(sequence_config).with_hook(move |light| {
            let mut state = hook_state.lock().unwrap_or_else(|err| err.into_inner());
            state.start = light.value();
            // The race clock restarts the moment the lights go green.
            if light == StartLight::Green {
                state.reset_timer(hook_clock.now_millis());
            }
        });
        let unit = Self {
            state,
            sequence: Arc::new(sequence),
            clock,
        };
        let now = unit.clock.now_millis();
        unit.state().reset_timer(now);
        unit
    }

    /// Locks and returns the track state.
    pub fn state(&self) -> MutexGuard<'_, CuState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// The start light machine wired to this unit.
    pub fn sequence(&self) -> &StartLightSequence {
        &self.sequence
    }

    /// Milliseconds on the race clock right now.
    pub fn race_millis(&self) -> u64 {
        let now = self.clock.now_millis();
        self.state().race_millis(now)
    }

    /// Restarts the race clock at zero.
    pub fn reset_race_clock(&self) {
        let now = self.clock.now_millis();
        self.state().reset_timer(now);
    }

    /// Queues a sector crossing stamped with the current race clock.
    pub fn push_timer(&self, address: u8, sector: u8) {
        let timestamp = (self.race_millis() & 0xFFFF_FFFF) as u32;
        self.push_timer_at(address, sector, timestamp);
    }

    /// Queues a sector crossing with an explicit timestamp.
    pub fn push_timer_at(&self, address: u8, sector: u8, timestamp: u32) {
        self.state().events.push_back(TimerEvent {
            address,
            timestamp,
            sector,
        });
    }

    /// Answers one request payload (delimiters already stripped) with one
    /// response payload, or `None` for an empty request.
    pub fn handle_request(&self, request: &[u8]) -> Option<Bytes> {
        let Some((&command, rest)) = request.split_first() else {
            return None;
        };
        // Clients append a checksum to every request; the reference unit
        // slices it off without verifying.
        let args = &rest[..rest.len().saturating_sub(1)];
        match command {
            wire::POLL => Some(self.poll_payload()),
            wire::VERSION => Some(self.version_payload()),
            wire::SET_WORD => {
                self.apply_set_word(args);
                Some(echo(request))
            }
            wire::PRESS => {
                self.apply_press(args);
                Some(echo(request))
            }
            wire::RESET => {
                self.reset_race_clock();
                debug!("race clock reset");
                Some(echo(request))
            }
            wire::IGNORE => {
                self.apply_ignore(args);
                Some(echo(request))
            }
            other => {
                warn!(command = other, "echoing unknown command");
                Some(echo(request))
            }
        }
    }

    fn poll_payload(&self) -> Bytes {
        let mut state = self.state();
        if let Some(event) = state.events.pop_front() {
            let mut writer = PayloadWriter::new(wire::POLL);
            writer.push_nibble(event.address + 1);
            writer.push_dword(event.timestamp);
            writer.push_nibble(event.sector);
            return writer.finish();
        }
        let mut writer = PayloadWriter::new(wire::POLL);
        writer.push_raw(&[wire::STATUS_MARKER]);
        for slot in 0..8 {
            writer.push_nibble(state.fuel[slot] & 0x0F);
        }
        writer.push_nibble(state.start & 0x0F);
        writer.push_nibble(state.mode & 0x0F);
        writer.push_byte(state.pit_mask());
        writer.push_nibble(state.display & 0x0F);
        writer.finish()
    }

    fn version_payload(&self) -> Bytes {
        let state = self.state();
        let mut writer = PayloadWriter::new(wire::VERSION);
        if state.version.len() == 4 && state.version.bytes().all(|b| b.is_ascii_digit()) {
            writer.push_raw(state.version.as_bytes());
        } else {
            warn!(version = %state.version, "version is not four digits, reporting default");
            writer.push_raw(b"5337");
        }
        writer.finish()
    }

    fn apply_set_word(&self, args: &[u8]) {
        if let Err(err) = self.try_set_word(args) {
            warn!(%err, "ignoring malformed set-word request");
        }
    }

    fn try_set_word(&self, args: &[u8]) -> slotlink_protocol::Result<()> {
        let mut reader = PayloadReader::new(args);
        let word_addr = reader.byte("word")?;
        let value = reader.nibble("value")?;
        let _repeat = reader.nibble("repeat")?;
        let which = word_addr & 0x1F;
        let address = usize::from(word_addr >> 5) & 0x07;
        let mut state = self.state();
        match which {
            word::SPEED => state.speed[address] = value,
            word::BRAKE => state.brake[address] = value,
            word::FUEL => state.fuel[address] = value,
            word::POSITION if value == word::CLEAR_ALL_POSITIONS => state.position = [0; 8],
            word::POSITION => state.position[address] = value,
            word::LAP_HIGH => state.lap_high = value,
            word::LAP_LOW => state.lap_low = value,
            other => trace!(word = other, address, value, "unsupported word ignored"),
        }
        Ok(())
    }

    fn apply_press(&self, args: &[u8]) {
        let mut reader = PayloadReader::new(args);
        let pressed = match reader.nibble("button") {
            Ok(pressed) => pressed,
            Err(err) => {
                warn!(%err, "ignoring malformed press request");
                return;
            }
        };
        match pressed {
            button::START_ENTER => self.press_start(),
            button::PACE_CAR_ESC => {
                if self.sequence.cancel() {
                    debug!("countdown cancelled");
                }
            }
            other => trace!(button = other, "button press ignored"),
        }
    }

    /// Start/enter either begins the countdown, pauses a running race, or
    /// resumes a paused one; during the countdown it does nothing.
    fn press_start(&self) {
        let light = self.sequence.light();
        if light == StartLight::Off {
            self.sequence.start();
        } else if light.is_racing() {
            self.sequence.pause();
        }
    }

    fn apply_ignore(&self, args: &[u8]) {
        let mut reader = PayloadReader::new(args);
        match reader.byte("mask") {
            Ok(mask) => self.state().ignore_mask = mask,
            Err(err) => warn!(%err, "ignoring malformed ignore request"),
        }
    }
}

impl Default for MockControlUnit {
    fn default() -> Self {
        Self::new()
    }
}

fn echo(request: &[u8]) -> Bytes {
    Bytes::copy_from_slice(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn manual_unit() -> (MockControlUnit, ManualClock) {
        let clock = ManualClock::new();
        // Long steps keep the light wherever a test put it.
        let config = SequenceConfig::default().with_step_interval(Duration::from_secs(60));
        let unit = MockControlUnit::with_parts(Arc::new(clock.clone()), config);
        (unit, clock)
    }

    #[test]
    fn fresh_state_matches_powered_on_unit() {
        let unit = MockControlUnit::new();
        let state = unit.state();
        assert_eq!(state.fuel, [15; 8]);
        assert_eq!(state.speed, [8; 8]);
        assert_eq!(state.brake, [8; 8]);
        assert_eq!(state.position, [0; 8]);
        assert_eq!(state.start, 0);
        assert_eq!(state.mode, 0);
        assert_eq!(state.pit, [false; 8]);
        assert_eq!(state.display, 8);
        assert_eq!(state.version, "5337");
    }

    #[test]
    fn push_timer_stamps_with_race_clock() {
        let (unit, clock) = manual_unit();
        clock.advance(Duration::from_millis(1000));
        unit.push_timer(0, 1);
        let state = unit.state();
        assert_eq!(
            state.events.front(),
            Some(&TimerEvent {
                address: 0,
                timestamp: 1000,
                sector: 1
            })
        );
    }

    #[test]
    fn reset_restarts_race_clock_but_keeps_events() {
        let (unit, clock) = manual_unit();
        clock.advance(Duration::from_secs(5));
        unit.push_timer(3, 1);
        assert_eq!(unit.race_millis(), 5000);

        let reply = unit.handle_request(b"==").unwrap();
        assert_eq!(&reply[..], b"==");
        assert_eq!(unit.race_millis(), 0);
        assert_eq!(unit.state().events.len(), 1);

        clock.advance(Duration::from_millis(250));
        assert_eq!(unit.race_millis(), 250);
    }

    #[test]
    fn poll_reports_status_when_no_event_is_queued() {
        let (unit, _clock) = manual_unit();
        let reply = unit.handle_request(b"??").unwrap();
        assert!(reply.starts_with(b"?:"));
        assert_eq!(reply.len(), 16);
    }

    #[test]
    fn poll_drains_queued_timer_events_first() {
        let (unit, _clock) = manual_unit();
        unit.push_timer_at(2, 1, 5000);

        let timer = unit.handle_request(b"??").unwrap();
        assert_eq!(timer[0], wire::POLL);
        assert_ne!(timer[1], wire::STATUS_MARKER);

        let status = unit.handle_request(b"??").unwrap();
        assert!(status.starts_with(b"?:"));
    }

    #[test]
    fn set_word_updates_slot_and_echoes() {
        let (unit, _clock) = manual_unit();
        let reply = unit.handle_request(b"J00?2;").unwrap();
        assert_eq!(&reply[..], b"J00?2;");
        assert_eq!(unit.state().speed[0], 15);
    }

    #[test]
    fn clear_positions_resets_every_slot() {
        let (unit, _clock) = manual_unit();
        unit.state().position = [1, 2, 3, 4, 5, 6, 7, 8];
        // word 6, address 0, value 9, repeat 1
        let mut writer = PayloadWriter::new(wire::SET_WORD);
        writer.push_byte(word::POSITION);
        writer.push_nibble(word::CLEAR_ALL_POSITIONS);
        writer.push_nibble(1);
        let request = writer.finish();
        unit.handle_request(&request).unwrap();
        assert_eq!(unit.state().position, [0; 8]);
    }

    #[test]
    fn start_button_runs_the_light_sequence() {
        let (unit, _clock) = manual_unit();
        let reply = unit.handle_request(b"T26").unwrap();
        assert_eq!(&reply[..], b"T26");
        assert_eq!(unit.state().start, 1);

        // Pace car / ESC aborts the countdown.
        let reply = unit.handle_request(b"T15").unwrap();
        assert_eq!(&reply[..], b"T15");
        assert_eq!(unit.state().start, 0);
    }

    #[test]
    fn unknown_commands_are_echoed_verbatim() {
        let (unit, _clock) = manual_unit();
        let reply = unit.handle_request(b"X8").unwrap();
        assert_eq!(&reply[..], b"X8");
    }

    #[test]
    fn malformed_set_word_is_ignored_but_acknowledged() {
        let (unit, _clock) = manual_unit();
        let before = unit.state().clone();
        let reply = unit.handle_request(b"J0").unwrap();
        assert_eq!(&reply[..], b"J0");
        let after = unit.state();
        assert_eq!(after.speed, before.speed);
        assert_eq!(after.fuel, before.fuel);
    }

    #[test]
    fn empty_request_yields_no_reply() {
        let (unit, _clock) = manual_unit();
        assert!(unit.handle_request(b"").is_none());
    }
}
