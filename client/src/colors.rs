/// Format RGB/RGBA as CSS color strings for the 2D context.
pub fn rgb_css(r: u8, g: u8, b: u8) -> String {
    format!("rgb({r},{g},{b})")
}

pub fn rgba_css(r: u8, g: u8, b: u8, a: f64) -> String {
    format!("rgba({r},{g},{b},{a})")
}

/// Brighten a color by a factor (1.0 = no change, >1.0 = brighter).
pub fn brighten(r: u8, g: u8, b: u8, factor: f64) -> (u8, u8, u8) {
    (
        ((r as f64 * factor).min(255.0)) as u8,
        ((g as f64 * factor).min(255.0)) as u8,
        ((b as f64 * factor).min(255.0)) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brighten_saturates_at_white() {
        assert_eq!(brighten(200, 100, 255, 1.5), (255, 150, 255));
        assert_eq!(brighten(10, 20, 30, 1.0), (10, 20, 30));
    }

    #[test]
    fn css_formatting() {
        assert_eq!(rgb_css(1, 2, 3), "rgb(1,2,3)");
        assert_eq!(rgba_css(255, 0, 0, 0.5), "rgba(255,0,0,0.5)");
    }
}
