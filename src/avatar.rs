use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Derive the avatar background color for a user without an uploaded
/// photo. Deterministic in the uid so every device renders the same
/// light pastel; the warm-start cache still persists the assignment so
/// it survives a change of derivation.
pub fn avatar_color(uid: &str) -> String {
    let mut hasher = DefaultHasher::new();
    uid.hash(&mut hasher);
    let seed = hasher.finish();

    let hue = seed % 360;
    let saturation = 50 + (seed >> 16) % 50;
    let lightness = 75 + (seed >> 32) % 15;

    format!("hsl({}, {}%, {}%)", hue, saturation, lightness)
}
