// FaceCube — Per-Face LED Colors
//
// Six-entry RGB table.  Written only by the config-write handler (with an
// already-validated packet), read by the LED flash path.  The table resets
// to the built-in defaults at boot; persistence is a client concern.

use crate::events::Face;
use crate::protocol::FaceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Firmware-embedded default colors, face 1 first.
const DEFAULT_COLORS: [Rgb; 6] = [
    Rgb { r: 255, g: 0, b: 0 },     // Face 1: red
    Rgb { r: 0, g: 255, b: 0 },     // Face 2: green
    Rgb { r: 0, g: 0, b: 255 },     // Face 3: blue
    Rgb { r: 255, g: 255, b: 0 },   // Face 4: yellow
    Rgb { r: 255, g: 0, b: 255 },   // Face 5: magenta
    Rgb { r: 128, g: 128, b: 128 }, // Face 6: gray
];

pub struct FacePalette {
    colors: [Rgb; 6],
}

impl FacePalette {
    pub fn new() -> Self {
        Self {
            colors: DEFAULT_COLORS,
        }
    }

    /// Apply a validated client config.  Applying the same config twice
    /// leaves the table unchanged.
    pub fn apply(&mut self, cfg: FaceConfig) {
        self.colors[(cfg.face_id - 1) as usize] = Rgb {
            r: cfg.r,
            g: cfg.g,
            b: cfg.b,
        };
    }

    /// Color for a face; black for `Unknown`.
    pub fn color_of(&self, face: Face) -> Rgb {
        match face.id() {
            1..=6 => self.colors[(face.id() - 1) as usize],
            _ => Rgb { r: 0, g: 0, b: 0 },
        }
    }
}
