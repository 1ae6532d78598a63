#![no_std]
#![no_main]

use bme680::{
    Bme680, I2CAddress, IIRFilterSize, OversamplingSetting, PowerMode, SettingsBuilder,
};
use bsp::entry;
use core::time::Duration;
use defmt::*;
use defmt_rtt as _;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal_0_2::adc::OneShot;
use panic_probe as _;
use rp_pico::hal::Timer;

// Provide an alias for our BSP so we can switch targets quickly.
// Uncomment the BSP you included in Cargo.toml, the rest of the code does not need to change.
use rp_pico as bsp;

use bsp::hal::{
    clocks::{init_clocks_and_plls, Clock},
    pac,
    watchdog::Watchdog,
};
use paddy_monitor::alert::Notifier;
use paddy_monitor::calibration::ButtonGate;
use paddy_monitor::moisture::{SoilAdc, SoilProbe};
use paddy_monitor::monitor::{Command, CommandOutcome, Monitor, Telemetry};
use paddy_monitor::npk::NpkClient;
use paddy_monitor::sensors::{Climate, ClimateSensor, Hardware};
use paddy_monitor::snapshot::SensorSnapshot;
use paddy_monitor::threshold::Severity;
use paddy_monitor::timer::Monotonic;
use paddy_monitor::SensorError;
use rp_pico::hal;
use rp_pico::hal::adc::{Adc, AdcPin};
use rp_pico::hal::fugit::RateExtU32;
use rp_pico::hal::gpio::bank0::{Gpio0, Gpio1, Gpio26, Gpio6, Gpio8, Gpio9};
use rp_pico::hal::gpio::{
    FunctionI2C, FunctionSio, FunctionUart, Pin, PullDown, PullNone, PullUp, SioInput, SioOutput,
};
use rp_pico::hal::uart::{DataBits, Enabled, StopBits, UartConfig, UartPeripheral};
use rp_pico::pac::{I2C0, UART0};

const NPK_BAUD: u32 = 4800;

type Bme = Bme680<
    hal::I2C<
        I2C0,
        (
            Pin<Gpio8, FunctionI2C, PullUp>,
            Pin<Gpio9, FunctionI2C, PullUp>,
        ),
    >,
    Timer,
>;

type Buzzer = Pin<Gpio6, FunctionSio<SioOutput>, PullDown>;

type NpkUart = UartPeripheral<
    Enabled,
    UART0,
    (
        Pin<Gpio0, FunctionUart, PullNone>,
        Pin<Gpio1, FunctionUart, PullNone>,
    ),
>;

#[entry]
fn main() -> ! {
    info!("PaddyMonitor Starting");
    // Grab our singleton objects
    let mut pac = pac::Peripherals::take().unwrap();
    let _core = pac::CorePeripherals::take().unwrap();

    // Set up the watchdog driver - needed by the clock setup code
    let mut watchdog = Watchdog::new(pac.WATCHDOG);

    // Configure the clocks
    //
    // The default is to generate a 125 MHz system clock
    let clocks = init_clocks_and_plls(
        rp_pico::XOSC_CRYSTAL_FREQ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()
    .unwrap();

    // The single-cycle I/O block controls our GPIO pins
    let sio = hal::Sio::new(pac.SIO);

    // Set the pins up according to their function on this particular board
    let pins = rp_pico::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    let mut delay = Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);

    // Set up BME680 (climate channel)
    let sda_pin: Pin<_, FunctionI2C, PullUp> = pins.gpio8.reconfigure();
    let scl_pin: Pin<_, FunctionI2C, PullUp> = pins.gpio9.reconfigure();
    let i2c = hal::I2C::i2c0(
        pac.I2C0,
        sda_pin,
        scl_pin,
        100.kHz(),
        &mut pac.RESETS,
        &clocks.system_clock,
    );
    let mut bme = Bme680::init(i2c, &mut delay, I2CAddress::Secondary).unwrap();
    let settings = SettingsBuilder::new()
        .with_humidity_oversampling(OversamplingSetting::OS2x)
        .with_pressure_oversampling(OversamplingSetting::OS4x)
        .with_temperature_oversampling(OversamplingSetting::OS8x)
        .with_temperature_filter(IIRFilterSize::Size3)
        .with_gas_measurement(Duration::from_millis(1500), 320, 25)
        .with_run_gas(false)
        .build();
    bme.set_sensor_settings(&mut delay, settings).unwrap();

    // Set up soil probe: ADC0 plus a switched supply rail
    let adc = Adc::new(pac.ADC, &mut pac.RESETS);
    let adc_pin = AdcPin::new(pins.gpio26.into_floating_input()).unwrap();
    let mut probe_power = pins.gpio16.into_push_pull_output();
    probe_power.set_low().unwrap();

    // Set up RS-485 transceiver: UART0 plus driver-enable
    let tx_pin: Pin<_, FunctionUart, PullNone> = pins.gpio0.reconfigure();
    let rx_pin: Pin<_, FunctionUart, PullNone> = pins.gpio1.reconfigure();
    let uart = UartPeripheral::new(pac.UART0, (tx_pin, rx_pin), &mut pac.RESETS)
    .enable(
        UartConfig::new(NPK_BAUD.Hz(), DataBits::Eight, None, StopBits::One),
        clocks.peripheral_clock.freq(),
    )
    .unwrap();
    let mut driver_enable = pins.gpio17.into_push_pull_output();
    driver_enable.set_low().unwrap();

    // Set up buttons
    let mut up_button = pins.gpio10.into_pull_down_input();
    let mut down_button = pins.gpio11.into_pull_down_input();
    let select_button = pins.gpio12.into_pull_down_input();

    // Set up buzzer
    let mut buzzer = pins.gpio6.into_push_pull_output();
    buzzer.set_low().unwrap();

    let hardware = Hardware {
        climate: BmeClimate { bme, timer: delay },
        soil: SoilProbe::new(PicoAdc { adc, pin: adc_pin }, probe_power),
        npk: NpkClient::new(PicoUart(uart), driver_enable),
        delay,
    };
    let clock = PicoClock(delay);
    let mut monitor = Monitor::new(
        hardware,
        BuzzerNotifier {
            buzzer,
            timer: delay,
        },
        RttTelemetry,
    );
    let mut operator = ButtonGate::new(select_button);

    match monitor.handle(Command::SelfTest, &mut operator) {
        Ok(CommandOutcome::SelfTest(health)) => info!("Self-test: {}", health),
        _ => warn!("Self-test did not run"),
    }

    // Cooldowns
    let mut button_cooldown: u8 = 0;

    info!("PaddyMonitor Ready, stage {}", monitor.stage().label);

    loop {
        delay.delay_ms(10);

        // Tick buttons
        button_cooldown = tick_buttons(button_cooldown);

        if button_cooldown == 0 {
            let up = up_button.is_high().unwrap();
            let down = down_button.is_high().unwrap();
            let command = if up && down {
                Some(Command::Calibrate)
            } else if up || down {
                let mut prefs = *monitor.preferences();
                prefs.step_stage(up);
                monitor.set_preferences(prefs);
                info!("Stage: {}", prefs.format_stage().as_str());
                None
            } else if operator.is_pressed() {
                Some(Command::Status)
            } else {
                None
            };

            if up || down || command.is_some() {
                button_cooldown = 50; // 500ms cooldown
            }

            if let Some(command) = command {
                match monitor.handle(command, &mut operator) {
                    Ok(CommandOutcome::Status(report)) => info!("{}", report.as_str()),
                    Ok(CommandOutcome::Calibrated(profile)) => {
                        info!("Calibrated: {}", profile)
                    }
                    Ok(CommandOutcome::SelfTest(health)) => info!("Self-test: {}", health),
                    Err(e) => warn!("{} failed: {}", command, e),
                }
            }
        }

        if let Some(report) = monitor.tick(clock.now_ms()) {
            debug!(
                "Cycle: {} findings, {}",
                report.findings.len(),
                report.decision
            );
        }
    }
}

/// BME680 on I2C0 as the climate channel
struct BmeClimate {
    bme: Bme,
    timer: Timer,
}

impl ClimateSensor for BmeClimate {
    fn read_climate<D: DelayNs>(&mut self, _delay: &mut D) -> Result<Climate, SensorError> {
        // The driver is bound to its own timer
        self.bme
            .set_sensor_mode(&mut self.timer, PowerMode::ForcedMode)
            .map_err(|_| SensorError::ClimateUnavailable)?;
        let (data, _) = self
            .bme
            .get_sensor_data(&mut self.timer)
            .map_err(|_| SensorError::ClimateUnavailable)?;
        Ok(Climate {
            temperature_c: data.temperature_celsius(),
            relative_humidity_pct: data.humidity_percent(),
        })
    }
}

struct PicoAdc {
    adc: Adc,
    pin: AdcPin<Pin<Gpio26, FunctionSio<SioInput>, PullNone>>,
}

impl SoilAdc for PicoAdc {
    type Error = ();

    fn read_raw(&mut self) -> Result<u16, ()> {
        nb::block!(self.adc.read(&mut self.pin)).map_err(|_| ())
    }
}

#[derive(Debug)]
struct UartFault;

impl embedded_io::Error for UartFault {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}

/// Blocking adapter from the HAL UART to the byte-stream traits the NPK client uses
struct PicoUart(NpkUart);

impl embedded_io::ErrorType for PicoUart {
    type Error = UartFault;
}

impl embedded_io::Read for PicoUart {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, UartFault> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.0.read_raw(buf) {
                Ok(n) => return Ok(n),
                Err(nb::Error::WouldBlock) => continue,
                Err(nb::Error::Other(_)) => return Err(UartFault),
            }
        }
    }
}

impl embedded_io::ReadReady for PicoUart {
    fn read_ready(&mut self) -> Result<bool, UartFault> {
        Ok(self.0.uart_is_readable())
    }
}

impl embedded_io::Write for PicoUart {
    fn write(&mut self, buf: &[u8]) -> Result<usize, UartFault> {
        self.0.write_full_blocking(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), UartFault> {
        while self.0.uart_is_busy() {}
        Ok(())
    }
}

struct PicoClock(Timer);

impl Monotonic for PicoClock {
    fn now_ms(&self) -> u64 {
        self.0.get_counter().ticks() / 1000
    }
}

/// Local alarm: logs the alert and sounds the buzzer.
/// Cloud and SMS gateways attach behind the same trait.
struct BuzzerNotifier {
    buzzer: Buzzer,
    timer: Timer,
}

impl Notifier for BuzzerNotifier {
    type Error = ();

    fn notify(&mut self, message: &str, severity: Severity) -> Result<(), ()> {
        warn!("ALERT {}: {}", severity, message);
        for _ in 0..3 {
            self.buzzer.set_high().map_err(|_| ())?;
            self.timer.delay_ms(200);
            self.buzzer.set_low().map_err(|_| ())?;
            self.timer.delay_ms(200);
        }
        Ok(())
    }
}

/// Telemetry over RTT until a data link collaborator is attached
struct RttTelemetry;

impl Telemetry for RttTelemetry {
    type Error = ();

    fn is_ready(&mut self) -> bool {
        true
    }

    fn publish(&mut self, snapshot: &SensorSnapshot) -> Result<(), ()> {
        info!("telemetry: {}", snapshot);
        Ok(())
    }
}

/// Ticks the cooldown for buttons
/// param cooldown: The amount of cooldown left
/// returns the new value for cooldown
fn tick_buttons(cooldown: u8) -> u8 {
    cooldown.saturating_sub(1)
}
