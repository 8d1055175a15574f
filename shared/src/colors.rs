/// Deterministic per-creator color via CRC32 hash of the display name.
/// Returns (r, g, b) from the first 3 bytes of the hash, lifted away from
/// black so attribution labels stay legible on the dark canvas.
pub fn creator_color(name: &str) -> (u8, u8, u8) {
    let hash = crc32fast::hash(name.as_bytes());
    let bytes = hash.to_be_bytes();
    (
        bytes[0] | 0x40,
        bytes[1] | 0x40,
        bytes[2] | 0x40,
    )
}

#[cfg(test)]
mod tests {
    use super::creator_color;

    #[test]
    fn creator_color_is_deterministic() {
        assert_eq!(creator_color("ada"), creator_color("ada"));
    }

    #[test]
    fn creator_color_varies_for_different_names() {
        assert_ne!(creator_color("ada"), creator_color("grace"));
    }

    #[test]
    fn creator_color_channels_stay_legible() {
        for name in ["", "a", "somebody", "名前"] {
            let (r, g, b) = creator_color(name);
            assert!(r >= 0x40 && g >= 0x40 && b >= 0x40);
        }
    }
}
