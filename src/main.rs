// FaceCube — Firmware Entry Point
//
// Boot sequence:
//   1. Bring up logging and the default NVS partition (the BT stack needs it).
//   2. Set up the shared I2C bus and self-test the accelerometer.
//   3. Configure the RGB indicator, battery ADC and charger-detect GPIO.
//   4. Start the BLE link — the GATT table builds asynchronously on the BT
//      task while the rest of boot continues.
//   5. Spawn the cube task (the single cooperative core loop) and park.

mod battery;
mod ble;
mod config;
mod debounce;
mod dispatch;
mod drivers;
mod events;
mod orientation;
mod palette;
mod protocol;
mod tasks;

use std::sync::{mpsc, Mutex};
use std::thread;
use std::time::Duration;

use esp_idf_hal::gpio::{
    AnyInputPin, AnyOutputPin, IOPin, Input, InputPin, Output, OutputPin, PinDriver,
};
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::prelude::*;

use esp_idf_svc::nvs::EspDefaultNvsPartition;

use crate::config::*;
use crate::drivers::battery_probe::BatteryProbe;
use crate::drivers::imu::Mpu6050;
use crate::drivers::led::RgbLed;

// ---------------------------------------------------------------------------
// Utility: milliseconds since boot
// ---------------------------------------------------------------------------
pub fn now_ms() -> i64 {
    unsafe { esp_idf_sys::esp_timer_get_time() / 1000 }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------
fn main() -> anyhow::Result<()> {
    // Link esp-idf-sys runtime patches and initialise logging.
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    log::info!("FaceCube firmware starting…");

    // ---- Peripherals ------------------------------------------------------
    let peripherals = Peripherals::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // ---- I2C bus (accelerometer) ------------------------------------------
    let i2c_config = I2cConfig::new().baudrate(400u32.kHz().into());
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio6, // SDA
        peripherals.pins.gpio7, // SCL
        &i2c_config,
    )?;
    // SAFETY: The I2C peripheral is a singleton obtained from `Peripherals::take()`.
    // It will live for the entire programme duration (embedded firmware never exits).
    let i2c_bus: &'static Mutex<I2cDriver<'static>> =
        Box::leak(Box::new(Mutex::new(unsafe { core::mem::transmute(i2c) })));

    // ---- Accelerometer self-test ------------------------------------------
    let imu = Mpu6050::new(i2c_bus);
    if imu.is_connected() {
        imu.init()?;
    } else {
        log::error!("Accelerometer self-test FAILED");
        // Continue anyway so we can still debug via serial.
    }

    // ---- RGB indicator ----------------------------------------------------
    // SAFETY: GPIO peripherals live forever, same argument as I2C above.
    let led_r: PinDriver<'static, AnyOutputPin, Output> = unsafe {
        core::mem::transmute(PinDriver::output(peripherals.pins.gpio3.downgrade_output())?)
    };
    let led_g: PinDriver<'static, AnyOutputPin, Output> = unsafe {
        core::mem::transmute(PinDriver::output(peripherals.pins.gpio4.downgrade_output())?)
    };
    let led_b: PinDriver<'static, AnyOutputPin, Output> = unsafe {
        core::mem::transmute(PinDriver::output(peripherals.pins.gpio5.downgrade_output())?)
    };
    let led = RgbLed::new(led_r, led_g, led_b);

    // ---- Battery probe ----------------------------------------------------
    let charge_pin: PinDriver<'static, AnyInputPin, Input> = unsafe {
        core::mem::transmute(PinDriver::input(
            peripherals.pins.gpio10.downgrade_input(),
        )?)
    };
    configure_pullup(&charge_pin);
    let probe = BatteryProbe::new(charge_pin)?;

    // ---- BLE link ---------------------------------------------------------
    let (link_tx, link_rx) = mpsc::channel();
    let link = ble::BleLink::start(peripherals.modem, nvs, link_tx)?;

    log::info!("Boot complete — entering normal operation");

    // ---- Spawn the cube task (maps to a FreeRTOS task via std::thread) -----
    thread::Builder::new()
        .name("cube".into())
        .stack_size(STACK_CUBE)
        .spawn(move || {
            tasks::cube::cube_task(imu, probe, led, link_rx, link);
        })?;

    // Main thread has nothing left to do — park it forever.
    loop {
        thread::sleep(Duration::from_secs(60));
    }
}

// ---------------------------------------------------------------------------
// Boot helpers
// ---------------------------------------------------------------------------

/// Configure internal pull-up on the charger-detect pin.  The PinDriver is
/// already created, so set it via the raw API.
fn configure_pullup(_pin: &PinDriver<'_, AnyInputPin, Input>) {
    unsafe {
        esp_idf_sys::gpio_set_pull_mode(
            PIN_CHARGE_DETECT,
            esp_idf_sys::gpio_pull_mode_t_GPIO_PULLUP_ONLY,
        );
    }
}
