//! Client metadata derived from request headers.

use serde::{Deserialize, Serialize};

/// Coarse device classification from the `User-Agent` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Desktop,
    Mobile,
    Tablet,
    Bot,
    Unknown,
}

/// Caller-derived metadata attached to every stored event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMeta {
    pub ip: String,
    pub device: DeviceClass,
    pub browser: String,
    pub os: String,
    pub country: Option<String>,
    pub region: Option<String>,
}

impl ClientMeta {
    /// Classify a client from its IP, `User-Agent` and CDN geo hints.
    pub fn from_request(
        ip: String,
        user_agent: Option<&str>,
        country: Option<String>,
        region: Option<String>,
    ) -> Self {
        let ua = user_agent.map(str::to_lowercase);
        let (device, browser, os) = match ua.as_deref() {
            Some(ua) => (
                classify_device(ua),
                classify_browser(ua).to_owned(),
                classify_os(ua).to_owned(),
            ),
            None => (DeviceClass::Unknown, "unknown".to_owned(), "unknown".to_owned()),
        };
        Self {
            ip,
            device,
            browser,
            os,
            country,
            region,
        }
    }
}

fn classify_device(ua: &str) -> DeviceClass {
    if ["bot", "crawler", "spider", "slurp"]
        .iter()
        .any(|marker| ua.contains(marker))
    {
        DeviceClass::Bot
    } else if ua.contains("ipad") || ua.contains("tablet") {
        DeviceClass::Tablet
    } else if ua.contains("android") && !ua.contains("mobile") {
        // Android tablets omit the "Mobile" token.
        DeviceClass::Tablet
    } else if ua.contains("mobile") || ua.contains("iphone") || ua.contains("android") {
        DeviceClass::Mobile
    } else {
        DeviceClass::Desktop
    }
}

fn classify_browser(ua: &str) -> &'static str {
    if ua.contains("edg/") {
        "edge"
    } else if ua.contains("opr/") || ua.contains("opera") {
        "opera"
    } else if ua.contains("firefox") || ua.contains("fxios") {
        "firefox"
    } else if ua.contains("chrome") || ua.contains("crios") {
        "chrome"
    } else if ua.contains("safari") {
        "safari"
    } else {
        "unknown"
    }
}

fn classify_os(ua: &str) -> &'static str {
    if ua.contains("windows") {
        "windows"
    } else if ua.contains("android") {
        "android"
    } else if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ios") {
        "ios"
    } else if ua.contains("mac os") || ua.contains("macintosh") {
        "macos"
    } else if ua.contains("linux") {
        "linux"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) \
         AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1";
    const GOOGLEBOT: &str =
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

    #[test]
    fn desktop_chrome_on_windows() {
        let meta = ClientMeta::from_request("1.2.3.4".into(), Some(CHROME_WIN), None, None);
        assert_eq!(meta.device, DeviceClass::Desktop);
        assert_eq!(meta.browser, "chrome");
        assert_eq!(meta.os, "windows");
    }

    #[test]
    fn mobile_safari_on_iphone() {
        let meta = ClientMeta::from_request("1.2.3.4".into(), Some(SAFARI_IPHONE), None, None);
        assert_eq!(meta.device, DeviceClass::Mobile);
        assert_eq!(meta.browser, "safari");
        assert_eq!(meta.os, "ios");
    }

    #[test]
    fn crawler_is_a_bot() {
        let meta = ClientMeta::from_request("1.2.3.4".into(), Some(GOOGLEBOT), None, None);
        assert_eq!(meta.device, DeviceClass::Bot);
    }

    #[test]
    fn missing_user_agent_is_unknown() {
        let meta = ClientMeta::from_request(
            "1.2.3.4".into(),
            None,
            Some("DE".into()),
            Some("BE".into()),
        );
        assert_eq!(meta.device, DeviceClass::Unknown);
        assert_eq!(meta.browser, "unknown");
        assert_eq!(meta.country.as_deref(), Some("DE"));
    }
}
