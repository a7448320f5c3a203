
// Floor for dB conversions so silence does not hit log10(0).
pub const DB_EPS: f32 = 1e-10;

pub fn frame_peak(x: &[f32]) -> f32 {
    let mut peak = 0.0f32;
    for &v in x {
        peak = peak.max(v.abs());
    }
    peak
}

pub fn frame_rms(x: &[f32]) -> f32 {
    let mut s = 0.0f32;
    for &v in x {
        s += v * v;
    }
    (s / (x.len().max(1) as f32)).sqrt()
}

pub fn lin_to_db(lin: f32) -> f32 {
    20.0 * lin.max(DB_EPS).log10()
}

pub fn db_to_lin(db: f32) -> f32 {
    (10.0f32).powf(db / 20.0)
}
