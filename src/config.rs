// FaceCube — Hardware & System Configuration
// Target: Seeed Studio Xiao ESP32-C3 (RISC-V)

// ---------------------------------------------------------------------------
// GPIO Pin Definitions (Xiao ESP32-C3 pinout)
// ---------------------------------------------------------------------------
pub const PIN_LED_R: i32 = 3;          // D1 — RGB indicator, red channel
pub const PIN_LED_G: i32 = 4;          // D2 — RGB indicator, green channel
pub const PIN_LED_B: i32 = 5;          // D3 — RGB indicator, blue channel
pub const PIN_I2C_SDA: i32 = 6;        // D4 — I2C data line
pub const PIN_I2C_SCL: i32 = 7;        // D5 — I2C clock line
pub const PIN_CHARGE_DETECT: i32 = 10; // D10 — charger status output (active LOW)
pub const PIN_BATTERY_ADC: u32 = 2;    // D0/A0 — battery voltage (ADC)

// ---------------------------------------------------------------------------
// I2C Bus
// ---------------------------------------------------------------------------
pub const I2C_ADDR_MPU6050: u8 = 0x68;
pub const I2C_TIMEOUT_TICKS: u32 = 1000; // FreeRTOS ticks

// ---------------------------------------------------------------------------
// Task Stack Sizes (bytes)
// ---------------------------------------------------------------------------
pub const STACK_CUBE: usize = 8192;

// ---------------------------------------------------------------------------
// Timing (milliseconds)
// ---------------------------------------------------------------------------
pub const CUBE_TICK_MS: u64 = 10;                       // cooperative loop cadence
pub const ORIENTATION_INTERVAL_MS: i64 = 180;           // ~5.5 Hz sampling to save power
pub const BATTERY_POLL_INTERVAL_MS: i64 = 10_000;
pub const BATTERY_BROADCAST_INTERVAL_MS: i64 = 300_000; // status packet every 5 min
pub const FACE_SETTLE_MS: i64 = 1500;                   // candidate must hold this long
pub const SYNC_GRACE_MS: i64 = 2000;                    // connect → state-sync delay
pub const LED_FLASH_MS: i64 = 2000;

// ---------------------------------------------------------------------------
// Orientation Thresholds (units of g)
// ---------------------------------------------------------------------------
pub const SMOOTH_WINDOW: usize = 6;
pub const MIN_AXIS_G: f32 = 0.55;    // below this the cube is flat/falling
pub const AXIS_MARGIN_G: f32 = 0.18; // dominant axis must win by this much

// ---------------------------------------------------------------------------
// Battery Thresholds (millivolts)
// ---------------------------------------------------------------------------
pub const LOW_BATT_MV: u16 = 3200;
pub const LOW_BATT_HYST_MV: u16 = 100; // re-arm only above LOW_BATT_MV + this
pub const CRITICAL_BATT_MV: u16 = 3000;
pub const ADC_READ_RETRIES: u8 = 3;

// ---------------------------------------------------------------------------
// MPU6050 Sensor Scale Factor
// ---------------------------------------------------------------------------
pub const ACCEL_SCALE_2G: f32 = 16384.0; // LSB/g at ±2 g

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------
pub const BLE_DEVICE_NAME: &str = "FaceCube";
pub const FIRMWARE_VERSION: (u8, u8, u8) = (0, 3, 0);
