//! The full client stack driven against the in-process emulator.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use slotlink_cu::{Button, ControlUnit, CuError, PollEvent};
use slotlink_sim::{MockConnection, MockControlUnit, MonotonicClock, SequenceConfig};

fn emulated() -> (ControlUnit, MockControlUnit) {
    let unit = MockControlUnit::new();
    let cu = ControlUnit::with_connection(MockConnection::new(unit.clone()));
    (cu, unit)
}

fn emulated_with_sequence(config: SequenceConfig) -> (ControlUnit, MockControlUnit) {
    let unit = MockControlUnit::with_parts(Arc::new(MonotonicClock::new()), config);
    let cu = ControlUnit::with_connection(MockConnection::new(unit.clone()));
    (cu, unit)
}

fn wait_for_light(unit: &MockControlUnit, value: u8) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while unit.state().start != value {
        assert!(Instant::now() < deadline, "light never reached {value}");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn version_reports_four_digits() {
    let (mut cu, _unit) = emulated();
    assert_eq!(cu.version().unwrap(), "5337");
}

#[test]
fn poll_returns_the_powered_on_status() {
    let (mut cu, _unit) = emulated();
    match cu.poll().unwrap() {
        PollEvent::Status(status) => {
            assert_eq!(status.fuel, [15; 8]);
            assert_eq!(status.start, 0);
            assert_eq!(status.display, 8);
            assert_eq!(status.pit, [false; 8]);
            assert!(!status.mode.fuel_mode());
        }
        PollEvent::Timer(timer) => panic!("unexpected timer: {timer:?}"),
    }
}

#[test]
fn queued_crossing_is_delivered_before_status() {
    let (mut cu, unit) = emulated();
    unit.push_timer_at(2, 1, 5000);

    match cu.poll().unwrap() {
        PollEvent::Timer(timer) => {
            assert_eq!(timer.address, 2);
            assert_eq!(timer.timestamp, 5000);
            assert_eq!(timer.sector, 1);
        }
        PollEvent::Status(status) => panic!("unexpected status: {status:?}"),
    }

    // The queue is drained, back to status snapshots.
    assert!(matches!(cu.poll().unwrap(), PollEvent::Status(_)));
}

#[test]
fn slot_settings_land_in_the_emulator() {
    let (mut cu, unit) = emulated();

    cu.set_speed(0, 15).unwrap();
    assert_eq!(unit.state().speed[0], 15);

    cu.set_brake(3, 7).unwrap();
    assert_eq!(unit.state().brake[3], 7);

    cu.set_fuel(1, 9).unwrap();
    assert_eq!(unit.state().fuel[1], 9);
}

#[test]
fn positions_can_be_set_and_cleared() {
    let (mut cu, unit) = emulated();

    cu.set_position(0, 1).unwrap();
    cu.set_position(5, 8).unwrap();
    {
        let state = unit.state();
        assert_eq!(state.position[0], 1);
        assert_eq!(state.position[5], 8);
    }

    cu.clear_positions().unwrap();
    assert_eq!(unit.state().position, [0; 8]);
}

#[test]
fn lap_counter_splits_into_high_and_low_nibbles() {
    let (mut cu, unit) = emulated();
    cu.set_lap(0xAB).unwrap();
    let state = unit.state();
    assert_eq!(state.lap_high, 0xA);
    assert_eq!(state.lap_low, 0xB);
}

#[test]
fn out_of_range_argument_fails_before_the_wire() {
    let (mut cu, _unit) = emulated();
    assert!(matches!(
        cu.set_speed(0, 16),
        Err(CuError::InvalidArgument { .. })
    ));
}

#[test]
fn start_button_counts_down_then_pauses_and_resumes() {
    let fast = SequenceConfig::default()
        .with_step_interval(Duration::from_millis(30))
        .with_green_duration(Duration::from_millis(30));
    let (mut cu, unit) = emulated_with_sequence(fast);

    cu.start().unwrap();
    wait_for_light(&unit, 9);

    // Start during a running race pauses it.
    cu.start().unwrap();
    assert_eq!(unit.state().start, 0);

    // A second press resumes straight into the race, no countdown.
    cu.start().unwrap();
    assert_eq!(unit.state().start, 8);
}

#[test]
fn esc_cancels_a_countdown() {
    let slow = SequenceConfig::default().with_step_interval(Duration::from_secs(60));
    let (mut cu, unit) = emulated_with_sequence(slow);

    cu.start().unwrap();
    assert_eq!(unit.state().start, 1);

    cu.press(Button::PaceCarEsc).unwrap();
    assert_eq!(unit.state().start, 0);
}

#[test]
fn reset_restarts_the_race_clock() {
    let (mut cu, unit) = emulated();
    cu.reset().unwrap();
    assert!(unit.race_millis() < 1000);
}
