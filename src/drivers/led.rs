// FaceCube — RGB Indicator Driver
//
// Three GPIO channels, on/off per channel (no PWM — the indicator only has
// to be recognisable, not color-accurate).  Flashes are timed and
// non-blocking: `flash` records the request, `update` is called from the
// cube loop and switches the LED off once the flash duration has elapsed.

use esp_idf_hal::gpio::{AnyOutputPin, Output, PinDriver};

use crate::config::LED_FLASH_MS;
use crate::palette::Rgb;

struct Flash {
    started_ms: i64,
}

pub struct RgbLed {
    red: PinDriver<'static, AnyOutputPin, Output>,
    green: PinDriver<'static, AnyOutputPin, Output>,
    blue: PinDriver<'static, AnyOutputPin, Output>,
    flash: Option<Flash>,
}

impl RgbLed {
    pub fn new(
        red: PinDriver<'static, AnyOutputPin, Output>,
        green: PinDriver<'static, AnyOutputPin, Output>,
        blue: PinDriver<'static, AnyOutputPin, Output>,
    ) -> Self {
        Self {
            red,
            green,
            blue,
            flash: None,
        }
    }

    fn set_color(&mut self, color: Rgb) {
        // Channel on when its component is non-zero.
        let _ = if color.r > 0 {
            self.red.set_high()
        } else {
            self.red.set_low()
        };
        let _ = if color.g > 0 {
            self.green.set_high()
        } else {
            self.green.set_low()
        };
        let _ = if color.b > 0 {
            self.blue.set_high()
        } else {
            self.blue.set_low()
        };
    }

    /// Show `color` for [`LED_FLASH_MS`]; a new flash supersedes a running one.
    pub fn flash(&mut self, color: Rgb, now_ms: i64) {
        self.set_color(color);
        self.flash = Some(Flash { started_ms: now_ms });
    }

    /// Call from the loop tick; turns the LED off when the flash expires.
    pub fn update(&mut self, now_ms: i64) {
        if let Some(flash) = &self.flash {
            if now_ms - flash.started_ms >= LED_FLASH_MS {
                self.set_color(Rgb { r: 0, g: 0, b: 0 });
                self.flash = None;
            }
        }
    }
}
