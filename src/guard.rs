use embedded_hal::digital::OutputPin;

/// Holds a control line high for as long as the guard lives.
///
/// Used for the soil probe power rail and the RS-485 driver-enable line. The
/// line is driven low again when the guard drops, on every exit path.
pub struct LineGuard<'a, P: OutputPin> {
    pin: &'a mut P,
}

impl<'a, P: OutputPin> LineGuard<'a, P> {
    pub fn assert(pin: &'a mut P) -> Result<Self, P::Error> {
        pin.set_high()?;
        Ok(Self { pin })
    }

    /// Releases early. Dropping the guard does the same but swallows the error.
    pub fn release(self) -> Result<(), P::Error> {
        let mut this = core::mem::ManuallyDrop::new(self);
        this.pin.set_low()
    }
}

impl<P: OutputPin> Drop for LineGuard<'_, P> {
    fn drop(&mut self) {
        if self.pin.set_low().is_err() {
            error!("failed to release control line");
        }
    }
}
