/// 金额统一保留两位小数
#[inline]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::round2;

    #[test]
    fn rounds_to_cents() {
        assert_eq!(round2(150.0), 150.0);
        assert_eq!(round2(200.0 * 1.5), 300.0);
        assert_eq!(round2(80.0 * (50.0 / 60.0)), 66.67);
        assert_eq!(round2(0.1 + 0.2), 0.3);
    }
}
