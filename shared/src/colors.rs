use crate::isochrone::TimeBand;

/// Fill colors for the three isochrone time bands, nearest first.
pub const BAND_COLORS: [(u8, u8, u8); 3] = [(46, 204, 113), (241, 196, 15), (231, 76, 60)];

/// Marker colors for regular, recommended and active features.
pub const MARKER_DEFAULT: (u8, u8, u8) = (52, 152, 219);
pub const MARKER_RECOMMENDED: (u8, u8, u8) = (39, 174, 96);
pub const MARKER_ACTIVE: (u8, u8, u8) = (230, 126, 34);
pub const MARKER_SEARCH_ADDRESS: (u8, u8, u8) = (142, 68, 173);

pub fn band_color(band: TimeBand) -> (u8, u8, u8) {
    BAND_COLORS[band.index()]
}

/// Format RGB as a `#rrggbb` hex string.
pub fn rgb_hex(r: u8, g: u8, b: u8) -> String {
    format!("#{r:02x}{g:02x}{b:02x}")
}

/// Format RGBA as a CSS color string.
pub fn rgba_css(r: u8, g: u8, b: u8, a: f64) -> String {
    format!("rgba({r},{g},{b},{a})")
}
