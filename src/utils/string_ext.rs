//! 字符串扩展工具模块
//!
//! 可选文本字段清理，以及手机号、时间格式等常用校验

use once_cell::sync::Lazy;
use regex::Regex;

pub static PHONE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^1[3-9]\d{9}$").expect("valid phone regex"));

pub static HHMM_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").expect("valid time regex"));

#[inline]
pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_REGEX.is_match(phone)
}

#[inline]
pub fn is_valid_hhmm(value: &str) -> bool {
    HHMM_REGEX.is_match(value)
}

/// 字符串清理扩展 trait
pub trait StringExt {
    /// 去除首尾空白，空字符串返回 None
    fn clean(&self) -> Option<String>;
}

impl StringExt for str {
    #[inline]
    fn clean(&self) -> Option<String> {
        let trimmed = self.trim();
        if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
    }
}

impl StringExt for String {
    #[inline]
    fn clean(&self) -> Option<String> {
        self.as_str().clean()
    }
}

impl<T: AsRef<str>> StringExt for Option<T> {
    #[inline]
    fn clean(&self) -> Option<String> {
        self.as_ref().and_then(|s| s.as_ref().clean())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_numbers() {
        assert!(is_valid_phone("13812345678"));
        assert!(!is_valid_phone("12812345678"));
        assert!(!is_valid_phone("1381234567"));
        assert!(!is_valid_phone("138123456789"));
    }

    #[test]
    fn hhmm_times() {
        assert!(is_valid_hhmm("22:00"));
        assert!(is_valid_hhmm("08:30"));
        assert!(!is_valid_hhmm("24:00"));
        assert!(!is_valid_hhmm("8:30"));
    }

    #[test]
    fn clean_drops_blank_values() {
        assert_eq!("  hi ".clean(), Some("hi".to_string()));
        assert_eq!(Some("   ").clean(), None);
        assert_eq!(None::<String>.clean(), None);
    }
}
