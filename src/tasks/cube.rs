// FaceCube — Cube Task
//
// The single cooperative loop that owns all core state.  Each tick:
//   1. drain link events (connect / disconnect / color config writes),
//   2. time-gated orientation update — sample, smooth, classify, debounce,
//      strictly in that order,
//   3. fire a pending state sync once its grace delay elapses,
//   4. time-gated battery poll,
//   5. LED flash upkeep, then a short sleep.
//
// Radio callbacks never touch this state directly; they only enqueue
// LinkEvents, so nothing here needs a lock.

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::battery::{BatteryEvent, BatteryMonitor};
use crate::ble::BleLink;
use crate::config::*;
use crate::debounce::{FaceAction, FaceTracker};
use crate::dispatch::Dispatcher;
use crate::drivers::battery_probe::BatteryProbe;
use crate::drivers::imu::Mpu6050;
use crate::drivers::led::RgbLed;
use crate::events::{Face, LinkEvent};
use crate::orientation::{classify, SampleWindow};
use crate::palette::FacePalette;
use crate::protocol::*;

pub fn cube_task(
    imu: Mpu6050,
    probe: BatteryProbe,
    mut led: RgbLed,
    link_rx: Receiver<LinkEvent>,
    link: Arc<BleLink>,
) {
    log::info!("Cube task started");

    let boot_ms = crate::now_ms();

    // ---- Initial face --------------------------------------------------
    // Seed the whole window with the first reading so the boot face does
    // not wander while the window fills.
    let mut window = SampleWindow::new();
    match imu.read_accel() {
        Ok(sample) => {
            for _ in 0..SMOOTH_WINDOW {
                window.add_sample(sample);
            }
        }
        Err(e) => log::warn!("IMU read failed at boot: {}", e),
    }
    let mut tracker = FaceTracker::new(classify(window.average()), boot_ms);
    log::info!("Initial face: {}", tracker.accepted().id());

    let mut dispatcher = Dispatcher::new(link);

    dispatcher.emit(EventPacket::new(EVENT_BOOT, 0, tracker.accepted().id()));
    let (major, minor, patch) = FIRMWARE_VERSION;
    dispatcher.emit(EventPacket::new(
        EVENT_VERSION,
        (major as u32) * 10_000 + (minor as u32) * 100 + patch as u32,
        0,
    ));

    // ---- Battery baseline ----------------------------------------------
    let initial_mv = probe.read_millivolts().unwrap_or(3700);
    let mut monitor = BatteryMonitor::new(initial_mv, probe.is_charging(), boot_ms);
    log::info!(
        "Battery: {} mV, {}%, {}",
        monitor.millivolts(),
        monitor.percentage(),
        if monitor.is_charging() { "charging" } else { "discharging" }
    );
    dispatcher.set_battery_level(monitor.percentage());

    let mut palette = FacePalette::new();
    let mut last_sample_ms = boot_ms;
    let mut last_battery_ms = boot_ms;
    let tick = Duration::from_millis(CUBE_TICK_MS);

    loop {
        let now = crate::now_ms();

        // 1. Link events from the BT task.
        while let Ok(event) = link_rx.try_recv() {
            match event {
                LinkEvent::Connected => dispatcher.on_connected(now),
                LinkEvent::Disconnected => dispatcher.on_disconnected(),
                LinkEvent::ColorConfig(bytes) => match decode_face_config(&bytes) {
                    Ok(cfg) => {
                        log::info!(
                            "Color config: face {} -> ({},{},{})",
                            cfg.face_id,
                            cfg.r,
                            cfg.g,
                            cfg.b
                        );
                        palette.apply(cfg);
                        // Preview the new color right away.
                        if let Some(face) = Face::from_id(cfg.face_id) {
                            led.flash(palette.color_of(face), now);
                        }
                    }
                    Err(e) => log::warn!("Rejected color config: {}", e),
                },
            }
        }

        // 2. Orientation pipeline.
        if now - last_sample_ms >= ORIENTATION_INTERVAL_MS {
            last_sample_ms = now;
            match imu.read_accel() {
                Ok(sample) => {
                    window.add_sample(sample);
                    match tracker.tick(classify(window.average()), now) {
                        Some(FaceAction::Switched(face)) => {
                            log::info!("Face switch -> {}", face.id());
                            dispatcher.emit_face_switch(face);
                            led.flash(palette.color_of(face), now);
                        }
                        Some(FaceAction::SessionTick { face, elapsed_s }) => {
                            dispatcher.emit(EventPacket::new(
                                EVENT_ONGOING_LOG,
                                elapsed_s,
                                face.id(),
                            ));
                        }
                        None => (),
                    }
                }
                // Sensor unavailable: hold the last known face.
                Err(e) => log::warn!("IMU read error: {}", e),
            }
        }

        // 3. Pending state sync.
        dispatcher.service_sync(now, tracker.accepted(), tracker.session_delta_s(now));

        // 4. Battery poll.
        if now - last_battery_ms >= BATTERY_POLL_INTERVAL_MS {
            last_battery_ms = now;
            let reading = probe.read_millivolts();
            let charging = probe.is_charging();
            for event in monitor.poll(reading, charging, now) {
                handle_battery_event(&dispatcher, event);
            }
            dispatcher.set_battery_level(monitor.percentage());
        }

        // 5. LED upkeep.
        led.update(now);

        thread::sleep(tick);
    }
}

fn handle_battery_event(dispatcher: &Dispatcher<Arc<BleLink>>, event: BatteryEvent) {
    match event {
        BatteryEvent::ChargingStarted => {
            log::info!("Battery: charging started");
            dispatcher.emit(EventPacket::new(EVENT_CHARGING_STARTED, 0, 0));
        }
        BatteryEvent::ChargingStopped => {
            log::info!("Battery: charging stopped");
            dispatcher.emit(EventPacket::new(EVENT_CHARGING_STOPPED, 0, 0));
        }
        BatteryEvent::FullyCharged => {
            log::info!("Battery: fully charged");
            dispatcher.emit(EventPacket::new(EVENT_FULLY_CHARGED, 0, 0));
        }
        BatteryEvent::LowBattery => {
            log::warn!("Battery: low voltage warning");
            dispatcher.emit(EventPacket::new(EVENT_LOW_BATTERY, 0, 0));
        }
        BatteryEvent::CriticalLow => {
            log::error!("Battery: below cutoff — shutting down");
            dispatcher.emit(EventPacket::new(EVENT_SHUTDOWN, 0, 0));
            enter_deep_sleep();
        }
        BatteryEvent::StatusBroadcast { mv, pct, charging } => {
            // Voltage in 10 mV units; MSB of the face byte carries the
            // charging flag, the low 7 bits the percentage.
            let status = pct | if charging { 0x80 } else { 0x00 };
            dispatcher.emit(EventPacket::new(
                EVENT_BATTERY_STATUS,
                (mv / 10) as u32,
                status,
            ));
        }
    }
}

/// Configure GPIO wakeup on the charger pin and enter deep sleep.
/// Plugging in USB power wakes the cube.  Does not return.
fn enter_deep_sleep() -> ! {
    log::info!(
        "Entering deep sleep — wake on charger attach (GPIO{})",
        PIN_CHARGE_DETECT
    );
    unsafe {
        esp_idf_sys::esp_deep_sleep_enable_gpio_wakeup(
            1u64 << PIN_CHARGE_DETECT,
            esp_idf_sys::esp_deepsleep_gpio_wake_up_mode_t_ESP_GPIO_WAKEUP_GPIO_LOW,
        );
        esp_idf_sys::esp_deep_sleep_start();
    }
}
