// FaceCube — Battery Probe
//
// Raw ESP-IDF one-shot ADC for the battery voltage divider, plus the
// charger-status GPIO (active LOW while USB power is charging the cell).
// Only the measurement lives here; thresholds and event logic are in the
// battery monitor.

use esp_idf_hal::gpio::{AnyInputPin, Input, PinDriver};

use crate::config::*;

pub struct BatteryProbe {
    handle: esp_idf_sys::adc_oneshot_unit_handle_t,
    channel: esp_idf_sys::adc_channel_t,
    charge_pin: PinDriver<'static, AnyInputPin, Input>,
}

impl BatteryProbe {
    /// One-time ADC setup via raw ESP-IDF calls.
    /// GPIO2 / ADC1_CHANNEL_2 with 11 dB attenuation (0–3.3 V range).
    pub fn new(charge_pin: PinDriver<'static, AnyInputPin, Input>) -> anyhow::Result<Self> {
        unsafe {
            let mut handle: esp_idf_sys::adc_oneshot_unit_handle_t = core::ptr::null_mut();
            let unit_cfg = esp_idf_sys::adc_oneshot_unit_init_cfg_t {
                unit_id: esp_idf_sys::adc_unit_t_ADC_UNIT_1,
                ulp_mode: esp_idf_sys::adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
                ..core::mem::zeroed()
            };
            let ret = esp_idf_sys::adc_oneshot_new_unit(&unit_cfg, &mut handle);
            if ret != esp_idf_sys::ESP_OK {
                anyhow::bail!("ADC unit init failed ({})", ret);
            }

            let chan_cfg = esp_idf_sys::adc_oneshot_chan_cfg_t {
                atten: esp_idf_sys::adc_atten_t_ADC_ATTEN_DB_11,
                bitwidth: esp_idf_sys::adc_bitwidth_t_ADC_BITWIDTH_12,
            };
            let channel = esp_idf_sys::adc_channel_t_ADC_CHANNEL_2; // GPIO2
            let ret = esp_idf_sys::adc_oneshot_config_channel(handle, channel, &chan_cfg);
            if ret != esp_idf_sys::ESP_OK {
                anyhow::bail!("ADC channel config failed ({})", ret);
            }

            Ok(Self {
                handle,
                channel,
                charge_pin,
            })
        }
    }

    /// Battery voltage in millivolts, or `None` when every bounded retry
    /// failed.  The caller keeps its previous reading in that case.
    pub fn read_millivolts(&self) -> Option<u16> {
        for attempt in 0..ADC_READ_RETRIES {
            let mut raw: i32 = 0;
            let ret =
                unsafe { esp_idf_sys::adc_oneshot_read(self.handle, self.channel, &mut raw) };
            if ret == esp_idf_sys::ESP_OK {
                // 1:2 resistor divider before the ADC pin.
                let volts = (raw as f32 / 4095.0) * 3.3 * 2.0;
                return Some((volts * 1000.0) as u16);
            }
            log::warn!("ADC read failed ({}), attempt {}", ret, attempt + 1);
        }
        None
    }

    /// Charger status pin is active LOW while charging.
    pub fn is_charging(&self) -> bool {
        self.charge_pin.is_low()
    }
}
