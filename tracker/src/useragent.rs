use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Best-effort classification of a pixel fetch from the two signals the
/// image request gives us: the User-Agent header and the source address.
/// Both are attacker-controllable, so everything here is advisory.

/// Closed device taxonomy. Classification is total: anything we cannot
/// place lands on `Desktop`, so histograms never grow arbitrary labels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    #[default]
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Desktop => "desktop",
            DeviceClass::Mobile => "mobile",
            DeviceClass::Tablet => "tablet",
        }
    }

    /// Parse a stored label back into the taxonomy, falling back to
    /// desktop for anything unrecognized.
    pub fn from_label(label: &str) -> DeviceClass {
        match label {
            "mobile" => DeviceClass::Mobile,
            "tablet" => DeviceClass::Tablet,
            _ => DeviceClass::Desktop,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientInfo {
    pub device: DeviceClass,
    pub browser: String,
    pub os: String,
}

// Tablets must be checked before phones: "android" without "mobile" is a
// tablet, iPads never say "mobile".
const TABLET_MARKERS: &[&str] = &["ipad", "tablet", "kindle", "silk/", "playbook"];
const MOBILE_MARKERS: &[&str] = &[
    "mobile",
    "iphone",
    "ipod",
    "blackberry",
    "windows phone",
    "opera mini",
    "webos",
];

/// User-Agent substrings of known mail-provider image proxies.
const PROXY_UA_MARKERS: &[&str] = &["googleimageproxy", "ggpht.com", "yahoomailproxy"];

/// Published address ranges of Google's image-fetching infrastructure,
/// which proxies every image in Gmail.
const PROXY_V4_RANGES: &[(u32, u32)] = &[
    cidr(66, 102, 0, 0, 20),
    cidr(66, 249, 80, 0, 20),
    cidr(64, 233, 160, 0, 19),
    cidr(209, 85, 128, 0, 17),
];

const fn cidr(a: u32, b: u32, c: u32, d: u32, bits: u32) -> (u32, u32) {
    let base = (a << 24) | (b << 16) | (c << 8) | d;
    let mask = if bits == 0 { 0 } else { u32::MAX << (32 - bits) };
    (base & mask, mask)
}

/// Classify the device, browser and OS out of a raw User-Agent header.
pub fn classify_user_agent(user_agent: &str) -> ClientInfo {
    let ua = user_agent.to_ascii_lowercase();

    let device = if TABLET_MARKERS.iter().any(|m| ua.contains(m))
        || (ua.contains("android") && !ua.contains("mobile"))
    {
        DeviceClass::Tablet
    } else if MOBILE_MARKERS.iter().any(|m| ua.contains(m)) || ua.contains("android") {
        DeviceClass::Mobile
    } else {
        DeviceClass::Desktop
    };

    ClientInfo {
        device,
        browser: browser_label(&ua),
        os: os_label(&ua),
    }
}

fn browser_label(ua: &str) -> String {
    let label = if ua.contains("edg/") || ua.contains("edge/") {
        "Edge"
    } else if ua.contains("opr/") || ua.contains("opera") {
        "Opera"
    } else if ua.contains("firefox/") {
        "Firefox"
    } else if ua.contains("chrome/") || ua.contains("crios/") {
        "Chrome"
    } else if ua.contains("safari/") {
        "Safari"
    } else if ua.contains("msie") || ua.contains("trident/") {
        "IE"
    } else {
        "Unknown"
    };

    label.to_string()
}

fn os_label(ua: &str) -> String {
    let label = if ua.contains("windows phone") {
        "Windows Phone"
    } else if ua.contains("windows") {
        "Windows"
    } else if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ipod") {
        "iOS"
    } else if ua.contains("mac os x") || ua.contains("macintosh") {
        "macOS"
    } else if ua.contains("android") {
        "Android"
    } else if ua.contains("cros") {
        "ChromeOS"
    } else if ua.contains("linux") {
        "Linux"
    } else {
        "Unknown"
    };

    label.to_string()
}

/// Whether this fetch came from a mail provider's image proxy rather than
/// the recipient's own device. Advisory metadata: the event is recorded
/// either way, this flag just travels with it.
pub fn is_proxy_fetch(user_agent: &str, source: IpAddr) -> bool {
    let ua = user_agent.to_ascii_lowercase();
    if PROXY_UA_MARKERS.iter().any(|m| ua.contains(m)) {
        return true;
    }

    match source {
        IpAddr::V4(v4) => {
            let addr = u32::from(v4);
            PROXY_V4_RANGES
                .iter()
                .any(|(base, mask)| addr & mask == *base)
        }
        // The known proxy fleets publish v4 ranges only.
        IpAddr::V6(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    use super::{classify_user_agent, is_proxy_fetch, DeviceClass};

    const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const IPAD_UA: &str = "Mozilla/5.0 (iPad; CPU OS 16_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1";
    const ANDROID_PHONE_UA: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";
    const ANDROID_TABLET_UA: &str = "Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";
    const WINDOWS_CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const GMAIL_PROXY_UA: &str =
        "Mozilla/5.0 (Windows NT 5.1; rv:11.0) Gecko Firefox/11.0 (via ggpht.com GoogleImageProxy)";

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(a, b, c, d))
    }

    #[test]
    fn classifies_phones() {
        assert_eq!(classify_user_agent(IPHONE_UA).device, DeviceClass::Mobile);
        assert_eq!(
            classify_user_agent(ANDROID_PHONE_UA).device,
            DeviceClass::Mobile
        );
    }

    #[test]
    fn classifies_tablets_before_phones() {
        assert_eq!(classify_user_agent(IPAD_UA).device, DeviceClass::Tablet);
        assert_eq!(
            classify_user_agent(ANDROID_TABLET_UA).device,
            DeviceClass::Tablet
        );
    }

    #[test]
    fn desktop_is_the_fallback() {
        assert_eq!(
            classify_user_agent(WINDOWS_CHROME_UA).device,
            DeviceClass::Desktop
        );
        assert_eq!(classify_user_agent("").device, DeviceClass::Desktop);
        assert_eq!(
            classify_user_agent("curl/8.4.0").device,
            DeviceClass::Desktop
        );
    }

    #[test]
    fn labels_browser_and_os() {
        let info = classify_user_agent(WINDOWS_CHROME_UA);
        assert_eq!(info.browser, "Chrome");
        assert_eq!(info.os, "Windows");

        let info = classify_user_agent(IPHONE_UA);
        assert_eq!(info.browser, "Safari");
        assert_eq!(info.os, "iOS");

        let info = classify_user_agent("");
        assert_eq!(info.browser, "Unknown");
        assert_eq!(info.os, "Unknown");
    }

    #[test]
    fn from_label_is_total() {
        assert_eq!(DeviceClass::from_label("mobile"), DeviceClass::Mobile);
        assert_eq!(DeviceClass::from_label("tablet"), DeviceClass::Tablet);
        assert_eq!(DeviceClass::from_label("desktop"), DeviceClass::Desktop);
        assert_eq!(DeviceClass::from_label("smartwatch"), DeviceClass::Desktop);
        assert_eq!(DeviceClass::from_label(""), DeviceClass::Desktop);
    }

    #[test]
    fn proxy_detected_from_user_agent_marker() {
        assert!(is_proxy_fetch(GMAIL_PROXY_UA, v4(10, 0, 0, 1)));
    }

    #[test]
    fn proxy_detected_from_address_range() {
        assert!(is_proxy_fetch(WINDOWS_CHROME_UA, v4(66, 249, 84, 1)));
        assert!(is_proxy_fetch("", v4(66, 102, 8, 12)));
        assert!(is_proxy_fetch("", v4(209, 85, 200, 3)));
    }

    #[test]
    fn ordinary_clients_are_not_proxies() {
        assert!(!is_proxy_fetch(WINDOWS_CHROME_UA, v4(192, 168, 1, 10)));
        assert!(!is_proxy_fetch(IPHONE_UA, v4(8, 8, 8, 8)));
        assert!(!is_proxy_fetch(
            WINDOWS_CHROME_UA,
            IpAddr::V6(Ipv6Addr::LOCALHOST)
        ));
    }
}
