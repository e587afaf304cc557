//! Input level metering for UI feedback

/// Root-mean-square amplitude of a block (0.0 for an empty block)
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Peak absolute amplitude of a block
#[must_use]
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}

/// Render a level as a fixed-width bar for terminal output
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn meter(level: f32, width: usize) -> String {
    // Speech RMS rarely exceeds 0.5, so scale up for visibility
    let filled = ((level * 2.0).clamp(0.0, 1.0) * width as f32) as usize;
    "█".repeat(filled) + &" ".repeat(width - filled)
}
