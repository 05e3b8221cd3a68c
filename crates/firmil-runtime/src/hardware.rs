//! Pin control over standard Firmata messages

use firmil_wire::frame::firmata;
use firmil_wire::{FrameBuilder, PinCapability, PinMode, PinState, Reply};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::error::{RuntimeError, RuntimeResult};
use crate::session::Session;
use crate::transport::Transport;

const PINS_PER_PORT: u8 = 8;

/// Pin facts learned from the device
#[derive(Debug, Default)]
pub struct PinTable {
    capabilities: Mutex<Option<Vec<PinCapability>>>,
    ports: Mutex<FxHashMap<u8, u16>>,
    reporting: Mutex<FxHashSet<u8>>,
}

impl PinTable {
    /// Store a digital port report
    pub fn record_port(&self, port: u8, value: u16) {
        self.ports.lock().insert(port, value);
    }

    /// Last reported level of `pin`
    pub fn level(&self, pin: u8) -> Option<bool> {
        let port = pin / PINS_PER_PORT;
        self.ports
            .lock()
            .get(&port)
            .map(|value| value & (1 << (pin % PINS_PER_PORT)) != 0)
    }

    /// Forget everything; the device restarted
    pub fn clear(&self) {
        *self.capabilities.lock() = None;
        self.ports.lock().clear();
        self.reporting.lock().clear();
    }
}

impl<T: Transport> Session<T> {
    /// Modes every pin supports, queried once per session
    pub async fn pin_capabilities(&self) -> RuntimeResult<Vec<PinCapability>> {
        if let Some(known) = self.pins.capabilities.lock().clone() {
            return Ok(known);
        }
        let frame = self.encode(|e| e.capability_query())?;
        let reply = self
            .exchange(&frame, |reply| matches!(reply, Reply::PinCapabilities(_)))
            .await?;
        let Reply::PinCapabilities(pins) = reply else {
            return Err(RuntimeError::internal("capability query claimed another reply"));
        };
        debug!(pins = pins.len(), "pin capabilities");
        *self.pins.capabilities.lock() = Some(pins.clone());
        Ok(pins)
    }

    /// Number of pins the device reports
    pub async fn pin_count(&self) -> RuntimeResult<usize> {
        Ok(self.pin_capabilities().await?.len())
    }

    /// Whether `pin` supports `mode`
    pub async fn supports_mode(&self, pin: u8, mode: PinMode) -> RuntimeResult<bool> {
        let pins = self.pin_capabilities().await?;
        let capability = pins
            .get(usize::from(pin))
            .ok_or_else(|| RuntimeError::pin(pin, format!("device has {} pins", pins.len())))?;
        Ok(capability.supports(mode))
    }

    /// Mode and state of `pin`
    pub async fn pin_state(&self, pin: u8) -> RuntimeResult<PinState> {
        let frame = self.encode(|e| e.pin_state_query(pin))?;
        let reply = self
            .exchange(&frame, |reply| matches!(reply, Reply::PinState(s) if s.pin == pin))
            .await?;
        let Reply::PinState(state) = reply else {
            return Err(RuntimeError::internal("pin state query claimed another reply"));
        };
        Ok(state)
    }

    /// Current mode of `pin`
    pub async fn pin_mode(&self, pin: u8) -> RuntimeResult<u8> {
        Ok(self.pin_state(pin).await?.mode)
    }

    /// Set the mode of `pin` and confirm the device applied it
    pub async fn set_pin_mode(&self, pin: u8, mode: PinMode) -> RuntimeResult<()> {
        if !self.supports_mode(pin, mode).await? {
            return Err(RuntimeError::pin(pin, format!("mode {mode:?} not supported")));
        }
        let frame = self.encode(|e| e.set_pin_mode(pin, mode))?;
        for _ in 0..self.config().attempts() {
            self.send(&frame)?;
            self.delay_us(self.config().pin_settle_us);
            if self.pin_mode(pin).await? == mode.to_byte() {
                return Ok(());
            }
        }
        Err(RuntimeError::pin(pin, format!("mode {mode:?} was not applied")))
    }

    /// Drive an output pin and confirm the level the device holds
    pub async fn write_digital(&self, pin: u8, high: bool) -> RuntimeResult<()> {
        let frame = self.encode(|e| e.set_digital_value(pin, high))?;
        self.send(&frame)?;
        self.delay_us(self.config().pin_settle_us);
        let state = self.pin_state(pin).await?;
        if state.state != u32::from(high) {
            return Err(RuntimeError::pin(pin, format!("holds {} after write", state.state)));
        }
        Ok(())
    }

    /// Level of an input pin, enabling port reports on first use
    pub async fn read_digital(&self, pin: u8) -> RuntimeResult<bool> {
        if let Some(level) = self.pins.level(pin) {
            return Ok(level);
        }
        let port = pin / PINS_PER_PORT;
        if self.pins.reporting.lock().insert(port) {
            let frame = FrameBuilder::message(firmata::REPORT_DIGITAL_PIN | (port & 0x0F))
                .byte(1)?
                .finish(self.max_message_size())?;
            self.send(&frame)?;
        }
        self.wait_until(&format!("digital report of port {port}"), || self.pins.level(pin))
            .await
    }
}
