pub mod auth;
pub mod booking;
pub mod campus;
pub mod coach;
pub mod coach_student;
pub mod comment;
pub mod competition;
pub mod evaluation;
pub mod extract;
pub mod license;
pub mod notification;
pub mod payment;
pub mod student;
pub mod system_log;
pub mod user;

use axum::http::{HeaderMap, header};

/// 请求来源：(客户端 IP, User-Agent)，IP 优先取反向代理写入的头
pub fn client_meta(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
        });
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    (ip, user_agent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1, 172.16.0.1"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.0"));
        let (ip, ua) = client_meta(&headers);
        assert_eq!(ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(ua.as_deref(), Some("curl/8.0"));
    }

    #[test]
    fn missing_headers_yield_none() {
        assert_eq!(client_meta(&HeaderMap::new()), (None, None));
    }
}
