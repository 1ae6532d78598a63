//! RS-485 NPK soil sensor client
//!
//! The sensor speaks a Modbus-RTU style read-holding-registers transaction over
//! a half-duplex transceiver. One transaction:
//!
//! 1. drop anything left in the receive buffer
//! 2. raise driver-enable, wait [`DIRECTION_LEAD_MS`], write [`REQUEST_FRAME`], flush
//! 3. drop driver-enable so the sensor can answer
//! 4. poll every [`POLL_STEP_MS`] for [`RESPONSE_LEN`] bytes, up to [`RESPONSE_TIMEOUT_MS`]
//!
//! A transaction blocks the caller for up to about a second.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_io::{Read, ReadReady, Write};

use crate::error::{FramingFault, NpkError};
use crate::guard::LineGuard;
use crate::timer::{Deadline, POLL_STEP_MS};

pub const DEVICE_ADDRESS: u8 = 0x01;
pub const READ_HOLDING_REGISTERS: u8 = 0x03;
pub const START_REGISTER: u16 = 0x0000;
pub const REGISTER_COUNT: u16 = 0x0007;

pub const REQUEST_LEN: usize = 8;
pub const RESPONSE_LEN: usize = 19; // addr + fn + count + 7 registers + crc

pub const DIRECTION_LEAD_MS: u32 = 10;
pub const RESPONSE_TIMEOUT_MS: u32 = 1000;

const NITROGEN_OFFSET: usize = 3;
const PHOSPHORUS_OFFSET: usize = 5;
const POTASSIUM_OFFSET: usize = 7;

// Upper bound on reads spent flushing a chattering line before a request
const MAX_STALE_READS: usize = 32;

/// Modbus CRC-16 (reflected polynomial 0xA001, initial value 0xFFFF)
pub const fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    let mut i = 0;
    while i < data.len() {
        crc ^= data[i] as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xA001 } else { crc >> 1 };
            bit += 1;
        }
        i += 1;
    }
    crc
}

const fn build_request() -> [u8; REQUEST_LEN] {
    let start = START_REGISTER.to_be_bytes();
    let count = REGISTER_COUNT.to_be_bytes();
    let body = [
        DEVICE_ADDRESS,
        READ_HOLDING_REGISTERS,
        start[0],
        start[1],
        count[0],
        count[1],
    ];
    let crc = crc16(&body).to_le_bytes();
    [
        body[0], body[1], body[2], body[3], body[4], body[5], crc[0], crc[1],
    ]
}

/// The only request this client ever sends
pub const REQUEST_FRAME: [u8; REQUEST_LEN] = build_request();

/// How much of a response frame is checked before fields are extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameCheck {
    /// Accept any frame of the right length
    #[default]
    Lenient,
    /// Also check address, function code, byte count and CRC
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NpkReading {
    pub nitrogen_mg_kg: u16,
    pub phosphorus_mg_kg: u16,
    pub potassium_mg_kg: u16,
}

impl NpkReading {
    /// Extracts the three big-endian register values from a response frame
    pub fn decode(frame: &[u8], check: FrameCheck) -> Result<Self, NpkError> {
        if frame.len() != RESPONSE_LEN {
            return Err(NpkError::Framing(FramingFault::Length));
        }
        if check == FrameCheck::Strict {
            validate(frame)?;
        }

        let field = |offset: usize| {
            frame
                .get(offset..offset + 2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]))
                .ok_or(NpkError::Framing(FramingFault::Length))
        };

        Ok(NpkReading {
            nitrogen_mg_kg: field(NITROGEN_OFFSET)?,
            phosphorus_mg_kg: field(PHOSPHORUS_OFFSET)?,
            potassium_mg_kg: field(POTASSIUM_OFFSET)?,
        })
    }
}

fn validate(frame: &[u8]) -> Result<(), NpkError> {
    let fault = |f| Err(NpkError::Framing(f));
    if frame[0] != DEVICE_ADDRESS {
        return fault(FramingFault::Address);
    }
    if frame[1] != READ_HOLDING_REGISTERS {
        return fault(FramingFault::Function);
    }
    if usize::from(frame[2]) != 2 * usize::from(REGISTER_COUNT) {
        return fault(FramingFault::ByteCount);
    }
    let (body, crc) = frame.split_at(RESPONSE_LEN - 2);
    if crc16(body) != u16::from_le_bytes([crc[0], crc[1]]) {
        return fault(FramingFault::Crc);
    }
    Ok(())
}

/// Where the client is in a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NpkState {
    Idle,
    Transmitting,
    AwaitingResponse,
    Complete,
    TimedOut,
}

pub struct NpkClient<S, E> {
    serial: S,
    direction: E,
    check: FrameCheck,
    state: NpkState,
}

impl<S, E> NpkClient<S, E>
where
    S: Read + Write + ReadReady,
    E: OutputPin,
{
    pub fn new(serial: S, direction: E) -> Self {
        Self {
            serial,
            direction,
            check: FrameCheck::default(),
            state: NpkState::Idle,
        }
    }

    pub fn set_frame_check(&mut self, check: FrameCheck) {
        self.check = check;
    }

    pub fn state(&self) -> NpkState {
        self.state
    }

    /// One full transaction
    pub fn read<D: DelayNs>(&mut self, delay: &mut D) -> Result<NpkReading, NpkError> {
        self.read_with_abort(delay, || false)
    }

    /// Like [`NpkClient::read`], but `abort` is checked on every poll of the
    /// response wait and ends the transaction early with [`NpkError::Aborted`].
    pub fn read_with_abort<D, F>(&mut self, delay: &mut D, abort: F) -> Result<NpkReading, NpkError>
    where
        D: DelayNs,
        F: FnMut() -> bool,
    {
        let result = self.transact(delay, abort);
        self.state = match result {
            Ok(_) => NpkState::Complete,
            Err(NpkError::Timeout { .. }) => NpkState::TimedOut,
            Err(_) => NpkState::Idle,
        };
        result
    }

    fn transact<D, F>(&mut self, delay: &mut D, abort: F) -> Result<NpkReading, NpkError>
    where
        D: DelayNs,
        F: FnMut() -> bool,
    {
        let stale = self.discard_stale()?;
        if stale > 0 {
            debug!("npk: discarded {} stale bytes", stale);
        }

        self.transmit(delay)?;

        let mut frame = [0u8; RESPONSE_LEN];
        self.receive(delay, &mut frame, abort)?;
        debug!("npk: rx {:?}", &frame[..]);

        NpkReading::decode(&frame, self.check)
    }

    fn discard_stale(&mut self) -> Result<usize, NpkError> {
        let mut scratch = [0u8; 16];
        let mut discarded = 0;
        for _ in 0..MAX_STALE_READS {
            if !self.serial.read_ready().map_err(|_| NpkError::Link)? {
                break;
            }
            let n = self.serial.read(&mut scratch).map_err(|_| NpkError::Link)?;
            if n == 0 {
                break;
            }
            discarded += n;
        }
        Ok(discarded)
    }

    fn transmit<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), NpkError> {
        self.state = NpkState::Transmitting;

        let driver = LineGuard::assert(&mut self.direction).map_err(|_| NpkError::Link)?;
        delay.delay_ms(DIRECTION_LEAD_MS);
        self.serial
            .write_all(&REQUEST_FRAME)
            .map_err(|_| NpkError::Link)?;
        self.serial.flush().map_err(|_| NpkError::Link)?;
        driver.release().map_err(|_| NpkError::Link)?;

        debug!("npk: tx {:?}", &REQUEST_FRAME[..]);
        self.state = NpkState::AwaitingResponse;
        Ok(())
    }

    fn receive<D, F>(
        &mut self,
        delay: &mut D,
        frame: &mut [u8; RESPONSE_LEN],
        mut abort: F,
    ) -> Result<(), NpkError>
    where
        D: DelayNs,
        F: FnMut() -> bool,
    {
        let mut filled = 0;
        let mut deadline = Deadline::new(RESPONSE_TIMEOUT_MS, POLL_STEP_MS);
        loop {
            while filled < RESPONSE_LEN && self.serial.read_ready().map_err(|_| NpkError::Link)? {
                let n = self
                    .serial
                    .read(&mut frame[filled..])
                    .map_err(|_| NpkError::Link)?;
                if n == 0 {
                    break;
                }
                filled += n;
            }

            if filled == RESPONSE_LEN {
                return Ok(());
            }
            if abort() {
                warn!("npk: read aborted after {} bytes", filled);
                return Err(NpkError::Aborted);
            }
            if !deadline.wait_step(delay) {
                warn!("npk: timeout, {} of {} bytes", filled, RESPONSE_LEN);
                return Err(NpkError::Timeout {
                    received: filled,
                    expected: RESPONSE_LEN,
                });
            }
        }
    }
}
