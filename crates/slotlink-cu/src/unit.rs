use std::time::Duration;

use tracing::{debug, trace, warn};

use slotlink_protocol::wire::{self, button, word};
use slotlink_protocol::{Frame, PayloadWriter};
use slotlink_transport::Connection;

use crate::error::{CuError, Result};
use crate::event::PollEvent;

/// Settings for a [`ControlUnit`].
#[derive(Debug, Clone)]
pub struct CuConfig {
    /// How long to wait for each response frame.
    pub request_timeout: Duration,
}

impl Default for CuConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(1),
        }
    }
}

impl CuConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Front panel buttons reachable through [`ControlUnit::press`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Button {
    PaceCarEsc = button::PACE_CAR_ESC,
    StartEnter = button::START_ENTER,
    Speed = button::SPEED,
    Brake = button::BRAKE,
    Fuel = button::FUEL,
    Code = button::CODE,
}

impl Button {
    pub fn id(self) -> u8 {
        self as u8
    }
}

/// Client for one control unit over any [`Connection`].
///
/// Traffic is strictly positional: each command writes one request frame
/// and treats the next valid frame as its response. Callers must serialize
/// access; issuing a second command before the first response is drained
/// desynchronizes the exchange.
pub struct ControlUnit {
    conn: Box<dyn Connection>,
    config: CuConfig,
}

impl ControlUnit {
    /// Connects to the device named by `device`; see
    /// [`classify`](slotlink_transport::classify) for the identifier
    /// grammar.
    pub fn open(device: &str) -> Result<Self> {
        let conn = slotlink_transport::open(device)?;
        Ok(Self {
            conn,
            config: CuConfig::default(),
        })
    }

    /// Wraps an already opened connection.
    pub fn with_connection<C: Connection + 'static>(conn: C) -> Self {
        Self {
            conn: Box::new(conn),
            config: CuConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CuConfig) -> Self {
        self.config = config;
        self
    }

    /// Polls the control unit once.
    pub fn poll(&mut self) -> Result<PollEvent> {
        let frame = self.request(PayloadWriter::new(wire::POLL).finish(), wire::POLL)?;
        PollEvent::from_frame(&frame)
    }

    /// Reads the firmware version, four ASCII digits.
    pub fn version(&mut self) -> Result<String> {
        let frame = self.request(PayloadWriter::new(wire::VERSION).finish(), wire::VERSION)?;
        let mut reader = frame.reader();
        reader.expect(wire::VERSION)?;
        let digits = reader.raw(4, "version")?;
        let version = String::from_utf8_lossy(digits).into_owned();
        reader.finish()?;
        Ok(version)
    }

    /// Sets the speed limit for one controller, 0-15.
    pub fn set_speed(&mut self, address: u8, value: u8) -> Result<()> {
        debug!(address, value, "set speed");
        self.set_word(word::SPEED, address, value, 2)
    }

    /// Sets the brake strength for one controller, 0-15.
    pub fn set_brake(&mut self, address: u8, value: u8) -> Result<()> {
        debug!(address, value, "set brake");
        self.set_word(word::BRAKE, address, value, 2)
    }

    /// Sets the fuel level for one controller, 0-15.
    pub fn set_fuel(&mut self, address: u8, value: u8) -> Result<()> {
        debug!(address, value, "set fuel");
        self.set_word(word::FUEL, address, value, 2)
    }

    /// Places a car on the position tower, positions 1-8.
    pub fn set_position(&mut self, address: u8, position: u8) -> Result<()> {
        check_range("position", position, 1, 8)?;
        debug!(address, position, "set position");
        self.set_word(word::POSITION, address, position, 1)
    }

    /// Clears the position tower for all cars.
    pub fn clear_positions(&mut self) -> Result<()> {
        debug!("clear positions");
        self.set_word(word::POSITION, 0, word::CLEAR_ALL_POSITIONS, 1)
    }

    /// Sets the lap count shown on connected displays, 0-255.
    pub fn set_lap(&mut self, value: u8) -> Result<()> {
        debug!(value, "set lap count");
        self.set_word(word::LAP_HIGH, 7, value >> 4, 1)?;
        self.set_word(word::LAP_LOW, 7, value & 0x0F, 1)
    }

    /// Writes one command word. The building block behind the `set_*`
    /// helpers, exposed for words this crate has no helper for.
    pub fn set_word(&mut self, word: u8, address: u8, value: u8, repeat: u8) -> Result<()> {
        check_range("word", word, 0, 31)?;
        check_range("address", address, 0, 7)?;
        check_range("value", value, 0, 15)?;
        check_range("repeat", repeat, 1, 15)?;
        let mut writer = PayloadWriter::new(wire::SET_WORD);
        writer.push_byte(word | (address << 5));
        writer.push_nibble(value);
        writer.push_nibble(repeat);
        self.request(writer.finish(), wire::SET_WORD)?;
        Ok(())
    }

    /// Tells the control unit to ignore the controllers set in `mask`.
    pub fn ignore(&mut self, mask: u8) -> Result<()> {
        debug!(mask, "ignore controllers");
        let mut writer = PayloadWriter::new(wire::IGNORE);
        writer.push_byte(mask);
        self.request(writer.finish(), wire::IGNORE)?;
        Ok(())
    }

    /// Resets the race timer.
    pub fn reset(&mut self) -> Result<()> {
        debug!("reset timer");
        self.request(PayloadWriter::new(wire::RESET).finish(), wire::RESET)?;
        Ok(())
    }

    /// Presses Start/Enter, beginning or pausing the start sequence.
    pub fn start(&mut self) -> Result<()> {
        self.press(Button::StartEnter)
    }

    /// Presses one of the front panel buttons.
    pub fn press(&mut self, button: Button) -> Result<()> {
        debug!(?button, "press button");
        let mut writer = PayloadWriter::new(wire::PRESS);
        writer.push_nibble(button.id());
        self.request(writer.finish(), wire::PRESS)?;
        Ok(())
    }

    /// Closes the underlying connection.
    pub fn close(mut self) -> Result<()> {
        self.conn.close()?;
        Ok(())
    }

    fn request(&mut self, payload: impl AsRef<[u8]>, expected: u8) -> Result<Frame> {
        let payload = payload.as_ref();
        trace!(command = payload[0], len = payload.len(), "request");
        self.conn.send(payload)?;
        let frame = self.conn.recv(self.config.request_timeout)?;
        if frame.command() != expected {
            warn!(
                expected,
                found = frame.command(),
                "response command mismatch"
            );
            return Err(CuError::UnexpectedResponse {
                expected: char::from(expected),
                found: char::from(frame.command()),
            });
        }
        Ok(frame)
    }
}

fn check_range(field: &'static str, value: u8, min: u8, max: u8) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(CuError::InvalidArgument {
            field,
            value: value.into(),
            min: min.into(),
            max: max.into(),
        })
    }
}
