use axum_extra::extract::cookie::{Cookie, CookieJar};

use super::jwt::TokenPair;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

fn session_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .path("/")
        .build()
}

pub fn set_session(jar: CookieJar, tokens: &TokenPair) -> CookieJar {
    jar.add(session_cookie(ACCESS_COOKIE, tokens.access_token.clone()))
        .add(session_cookie(REFRESH_COOKIE, tokens.refresh_token.clone()))
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = session_cookie(name, String::new());
    cookie.make_removal();
    cookie
}

/// Always emits expiring cookies, even when the request carried none.
pub fn clear_session(jar: CookieJar) -> CookieJar {
    jar.add(removal_cookie(ACCESS_COOKIE))
        .add(removal_cookie(REFRESH_COOKIE))
}

pub fn refresh_token(jar: &CookieJar) -> Option<String> {
    jar.get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    fn set_cookie_headers(jar: CookieJar) -> Vec<String> {
        let res = (jar, "").into_response();
        res.headers()
            .get_all(axum::http::header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn session_cookies_are_http_only_and_secure() {
        let tokens = TokenPair {
            access_token: "aaa".into(),
            refresh_token: "rrr".into(),
        };
        let headers = set_cookie_headers(set_session(CookieJar::new(), &tokens));
        assert_eq!(headers.len(), 2);
        for h in &headers {
            assert!(h.contains("HttpOnly"), "{h}");
            assert!(h.contains("Secure"), "{h}");
        }
        assert!(headers.iter().any(|h| h.starts_with("accessToken=aaa")));
        assert!(headers.iter().any(|h| h.starts_with("refreshToken=rrr")));
    }

    #[test]
    fn clearing_expires_both_cookies() {
        let headers = set_cookie_headers(clear_session(CookieJar::new()));
        assert_eq!(headers.len(), 2);
        assert!(headers.iter().any(|h| h.starts_with("accessToken=")));
        assert!(headers.iter().any(|h| h.starts_with("refreshToken=")));
        for h in &headers {
            assert!(h.contains("Max-Age=0"), "{h}");
        }
    }

    #[test]
    fn reads_refresh_cookie() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            "accessToken=a; refreshToken=r".parse().unwrap(),
        );
        let jar = CookieJar::from_headers(&headers);
        assert_eq!(refresh_token(&jar).as_deref(), Some("r"));
        assert_eq!(refresh_token(&CookieJar::new()), None);
    }
}
