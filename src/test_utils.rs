#![cfg(test)]

use glam::DVec3;

pub fn assert_float_is_close(x: f64, y: f64) {
    assert!((x - y).abs() < 10.0 * f64::EPSILON, "{} {}", x, y)
}

pub fn assert_close_tol(x: f64, y: f64, tol: f64) {
    assert!((x - y).abs() < tol, "{} {} (tol {})", x, y, tol)
}

pub fn assert_vec_is_close(x: DVec3, y: DVec3) {
    assert!((x - y).length() < 10.0 * f64::EPSILON, "{} {}", x, y)
}

pub fn assert_rel_close(x: f64, y: f64, rel: f64) {
    let scale = x.abs().max(y.abs()).max(f64::MIN_POSITIVE);
    assert!((x - y).abs() / scale < rel, "{} {} (rel {})", x, y, rel)
}
