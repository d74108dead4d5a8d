use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    YouTube,
    TikTok,
    Instagram,
    Unknown,
}

struct Rule {
    platform: Platform,
    domains: &'static [&'static str],
    path_prefixes: &'static [&'static str],
}

// Ordered; first match wins.
const RULES: &[Rule] = &[
    Rule {
        platform: Platform::YouTube,
        domains: &["youtube.com", "youtu.be"],
        path_prefixes: &[],
    },
    Rule {
        platform: Platform::TikTok,
        domains: &["tiktok.com"],
        path_prefixes: &[],
    },
    Rule {
        platform: Platform::Instagram,
        domains: &["instagram.com"],
        path_prefixes: &["/p/", "/reel/", "/tv/"],
    },
];

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::TikTok => "tiktok",
            Platform::Instagram => "instagram",
            Platform::Unknown => "unknown",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::YouTube => "YouTube",
            Platform::TikTok => "TikTok",
            Platform::Instagram => "Instagram",
            Platform::Unknown => "Unknown",
        }
    }

    /// Text for live feedback while the user types a URL.
    pub fn label(&self) -> &'static str {
        match self {
            Platform::YouTube => "YouTube detected",
            Platform::TikTok => "TikTok detected",
            Platform::Instagram => "Instagram detected",
            Platform::Unknown => "Unknown platform",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Platform::YouTube => "blue",
            Platform::TikTok => "purple",
            Platform::Instagram => "orange",
            Platform::Unknown => "red",
        }
    }

    /// Only YouTube honours the quality selector.
    pub fn supports_quality(&self) -> bool {
        matches!(self, Platform::YouTube)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Classifies a URL without allocating. Safe to call on every keystroke.
pub fn classify(url: &str) -> Platform {
    let Some(rest) = strip_http_scheme(url.trim()) else {
        return Platform::Unknown;
    };

    let (authority, path) = match rest.find(['/', '?', '#']) {
        Some(idx) => {
            let tail = &rest[idx..];
            let path = if tail.starts_with('/') { tail } else { "" };
            (&rest[..idx], path)
        }
        None => (rest, ""),
    };

    let host = host_of(authority);
    if host.is_empty() {
        return Platform::Unknown;
    }

    RULES
        .iter()
        .find(|rule| {
            rule.domains.iter().any(|d| host_matches(host, d))
                && (rule.path_prefixes.is_empty()
                    || rule.path_prefixes.iter().any(|p| path.starts_with(p)))
        })
        .map(|rule| rule.platform)
        .unwrap_or(Platform::Unknown)
}

pub fn is_http_url(url: &str) -> bool {
    strip_http_scheme(url.trim()).is_some()
}

fn strip_http_scheme(url: &str) -> Option<&str> {
    for scheme in ["https://", "http://"] {
        if let Some(head) = url.get(..scheme.len()) {
            if head.eq_ignore_ascii_case(scheme) {
                return Some(&url[scheme.len()..]);
            }
        }
    }
    None
}

fn host_of(authority: &str) -> &str {
    let host = authority
        .rsplit_once('@')
        .map(|(_, h)| h)
        .unwrap_or(authority);
    let host = if host.starts_with('[') {
        host
    } else {
        host.split_once(':').map(|(h, _)| h).unwrap_or(host)
    };
    host.trim_end_matches('.')
}

fn host_matches(host: &str, domain: &str) -> bool {
    if host.eq_ignore_ascii_case(domain) {
        return true;
    }
    if host.len() <= domain.len() {
        return false;
    }
    let offset = host.len() - domain.len();
    host.as_bytes()[offset - 1] == b'.'
        && host
            .get(offset..)
            .is_some_and(|suffix| suffix.eq_ignore_ascii_case(domain))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn youtube_hosts() {
        assert_eq!(classify("https://www.youtube.com/watch?v=abc"), Platform::YouTube);
        assert_eq!(classify("https://youtu.be/abc123"), Platform::YouTube);
        assert_eq!(classify("http://m.youtube.com/shorts/xyz"), Platform::YouTube);
        assert_eq!(classify("https://music.youtube.com"), Platform::YouTube);
    }

    #[test]
    fn tiktok_hosts() {
        assert_eq!(
            classify("https://www.tiktok.com/@user/video/7300000000"),
            Platform::TikTok
        );
        assert_eq!(classify("https://vm.tiktok.com/ZMabc/"), Platform::TikTok);
    }

    #[test]
    fn instagram_requires_media_path() {
        assert_eq!(classify("https://instagram.com/reel/xyz"), Platform::Instagram);
        assert_eq!(classify("https://www.instagram.com/p/Cabc/"), Platform::Instagram);
        assert_eq!(classify("https://www.instagram.com/tv/Cabc"), Platform::Instagram);
        assert_eq!(classify("https://www.instagram.com/someuser/"), Platform::Unknown);
        assert_eq!(classify("https://www.instagram.com"), Platform::Unknown);
    }

    #[test]
    fn non_http_and_empty_are_unknown() {
        assert_eq!(classify(""), Platform::Unknown);
        assert_eq!(classify("   "), Platform::Unknown);
        assert_eq!(classify("ftp://example.com"), Platform::Unknown);
        assert_eq!(classify("ftp://youtube.com/watch?v=abc"), Platform::Unknown);
        assert_eq!(classify("youtube.com/watch?v=abc"), Platform::Unknown);
        assert_eq!(classify("https://"), Platform::Unknown);
    }

    #[test]
    fn lookalike_hosts_do_not_match() {
        assert_eq!(classify("https://notyoutube.com/watch?v=abc"), Platform::Unknown);
        assert_eq!(classify("https://youtube.com.evil.net/watch"), Platform::Unknown);
        assert_eq!(classify("https://example.com/youtube.com"), Platform::Unknown);
    }

    #[test]
    fn scheme_and_host_case_insensitive() {
        assert_eq!(classify("HTTPS://WWW.YOUTUBE.COM/watch?v=abc"), Platform::YouTube);
        assert_eq!(classify("Https://TikTok.com/@a"), Platform::TikTok);
    }

    #[test]
    fn port_userinfo_and_query_are_ignored() {
        assert_eq!(classify("https://youtube.com:443/watch?v=abc"), Platform::YouTube);
        assert_eq!(classify("https://user@youtu.be/abc"), Platform::YouTube);
        assert_eq!(classify("https://youtu.be?x=1"), Platform::YouTube);
        assert_eq!(classify("https://instagram.com?next=/p/abc"), Platform::Unknown);
    }

    #[test]
    fn non_ascii_input_does_not_panic() {
        assert_eq!(classify("https://ютуб.рф/видео"), Platform::Unknown);
        assert_eq!(classify("httpé://youtube.com"), Platform::Unknown);
        assert_eq!(classify("https://ü.youtube.com/x"), Platform::YouTube);
    }

    #[test]
    fn only_youtube_supports_quality() {
        assert!(Platform::YouTube.supports_quality());
        assert!(!Platform::TikTok.supports_quality());
        assert!(!Platform::Instagram.supports_quality());
        assert!(!Platform::Unknown.supports_quality());
    }

    #[test]
    fn http_url_check() {
        assert!(is_http_url("http://a"));
        assert!(is_http_url("  https://a  "));
        assert!(!is_http_url("file:///etc/passwd"));
    }
}
