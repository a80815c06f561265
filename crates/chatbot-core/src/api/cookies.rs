//! Cookie helpers: CSRF token lookup and session persistence between runs.

use std::fs;
use std::path::Path;

use reqwest::cookie::Jar;
use reqwest::Url;

/// Cookie the backend uses for its anti-forgery token.
pub const CSRF_COOKIE: &str = "csrftoken";

/// Header the backend expects the CSRF token echoed in.
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Find `name` in a `Cookie` header value ("a=1; b=2").
pub fn cookie_value(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == name).then(|| value.to_string())
        })
}

/// Load saved `name=value` pairs into the jar. Returns how many were restored.
pub fn restore_session(path: &Path, jar: &Jar, url: &Url) -> std::io::Result<usize> {
    if !path.exists() {
        return Ok(0);
    }

    let saved = fs::read_to_string(path)?;
    let mut restored = 0;
    for pair in saved.split(';').map(str::trim).filter(|p| p.contains('=')) {
        jar.add_cookie_str(&format!("{}; Path=/", pair), url);
        restored += 1;
    }
    Ok(restored)
}

/// Write the current cookie header to `path`, or remove the file when empty.
pub fn save_session(path: &Path, header: Option<&str>) -> std::io::Result<()> {
    match header.filter(|h| !h.trim().is_empty()) {
        Some(header) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, header)
        }
        None => clear_session(path),
    }
}

pub fn clear_session(path: &Path) -> std::io::Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore;

    #[test]
    fn test_cookie_value_finds_token() {
        let header = "sessionid=abc123; csrftoken=tok%20en; theme=dark";
        assert_eq!(cookie_value(header, "csrftoken").as_deref(), Some("tok%20en"));
        assert_eq!(cookie_value(header, "sessionid").as_deref(), Some("abc123"));
        assert_eq!(cookie_value(header, "missing"), None);
    }

    #[test]
    fn test_cookie_value_requires_exact_name() {
        assert_eq!(cookie_value("xcsrftoken=nope", "csrftoken"), None);
    }

    #[test]
    fn test_session_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.txt");
        let url = Url::parse("http://localhost:8000/api").unwrap();

        save_session(&path, Some("sessionid=abc; csrftoken=xyz")).unwrap();

        let jar = Jar::default();
        assert_eq!(restore_session(&path, &jar, &url).unwrap(), 2);

        let header = jar.cookies(&url).unwrap();
        let header = header.to_str().unwrap();
        assert_eq!(cookie_value(header, "sessionid").as_deref(), Some("abc"));
        assert_eq!(cookie_value(header, "csrftoken").as_deref(), Some("xyz"));
    }

    #[test]
    fn test_saving_nothing_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.txt");
        fs::write(&path, "sessionid=old").unwrap();

        save_session(&path, None).unwrap();
        assert!(!path.exists());

        let jar = Jar::default();
        let url = Url::parse("http://localhost:8000/api").unwrap();
        assert_eq!(restore_session(&path, &jar, &url).unwrap(), 0);
    }
}
