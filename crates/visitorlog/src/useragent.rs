//! User-agent classification.
//!
//! Browser and OS are closed enumerations produced by ordered rule tables:
//! the first rule whose pattern matches wins. Tokens that appear inside more
//! general user-agents (Edge and Opera both carry `Chrome/`, Chrome carries
//! `Safari/`, Android carries `Linux`, iOS carries `Mac OS X`) must therefore
//! be listed before the rules they would otherwise fall through to.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Browser family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Browser {
    /// Chromium-based Microsoft Edge.
    Edge,
    /// Opera.
    Opera,
    /// Google Chrome or another plain Chromium.
    Chrome,
    /// Mozilla Firefox.
    Firefox,
    /// Apple Safari and other WebKit shells.
    Safari,
    /// Nothing matched.
    Unknown,
}

/// Operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Os {
    /// Microsoft Windows.
    Windows,
    /// Apple iOS / iPadOS.
    #[serde(rename = "iOS")]
    Ios,
    /// Apple macOS.
    #[serde(rename = "macOS")]
    MacOs,
    /// Android.
    Android,
    /// Desktop Linux.
    Linux,
    /// Nothing matched.
    Unknown,
}

/// Device form factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    /// Tablet marker present.
    Tablet,
    /// Mobile marker present.
    Mobile,
    /// Neither marker; `touch` when touch points were reported.
    Desktop {
        /// Whether the device reports touch input.
        touch: bool,
    },
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Edge => "Edge",
            Self::Opera => "Opera",
            Self::Chrome => "Chrome",
            Self::Firefox => "Firefox",
            Self::Safari => "Safari",
            Self::Unknown => "Unknown",
        })
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Windows => "Windows",
            Self::Ios => "iOS",
            Self::MacOs => "macOS",
            Self::Android => "Android",
            Self::Linux => "Linux",
            Self::Unknown => "Unknown",
        })
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tablet => "Tablet",
            Self::Mobile => "Mobile",
            Self::Desktop { touch: true } => "Touch laptop/desktop",
            Self::Desktop { touch: false } => "Desktop",
        })
    }
}

/// One classification rule.
#[derive(Debug)]
struct Rule<T> {
    value: T,
    regex: Regex,
}

impl<T: Copy> Rule<T> {
    fn new(value: T, pattern: &str) -> Self {
        Self {
            value,
            regex: Regex::new(pattern).expect("Invalid user-agent pattern"),
        }
    }
}

fn first_match<T: Copy>(rules: &[Rule<T>], user_agent: &str, fallback: T) -> T {
    rules
        .iter()
        .find(|rule| rule.regex.is_match(user_agent))
        .map_or(fallback, |rule| rule.value)
}

static BROWSER_RULES: LazyLock<Vec<Rule<Browser>>> = LazyLock::new(|| {
    vec![
        Rule::new(Browser::Edge, r"Edg(?:e|A|iOS)?/"),
        Rule::new(Browser::Opera, r"OPR/"),
        Rule::new(Browser::Chrome, r"Chrome/"),
        Rule::new(Browser::Firefox, r"Firefox/"),
        Rule::new(Browser::Safari, r"Safari/"),
    ]
});

static OS_RULES: LazyLock<Vec<Rule<Os>>> = LazyLock::new(|| {
    vec![
        Rule::new(Os::Windows, r"Windows NT"),
        Rule::new(Os::Ios, r"iPhone|iPad|iPod"),
        Rule::new(Os::MacOs, r"Mac OS X"),
        Rule::new(Os::Android, r"Android"),
        Rule::new(Os::Linux, r"Linux"),
    ]
});

static TABLET_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"iPad|Tablet").expect("Invalid user-agent pattern"));

static MOBILE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Mobi|Android").expect("Invalid user-agent pattern"));

/// Classify the browser family of a user-agent string.
#[must_use]
pub fn classify_browser(user_agent: &str) -> Browser {
    first_match(&BROWSER_RULES, user_agent, Browser::Unknown)
}

/// Classify the operating system of a user-agent string.
#[must_use]
pub fn classify_os(user_agent: &str) -> Os {
    first_match(&OS_RULES, user_agent, Os::Unknown)
}

/// Classify the form factor from the user-agent and reported touch points.
#[must_use]
pub fn classify_device(user_agent: &str, max_touch_points: u32) -> Device {
    if TABLET_MARKER.is_match(user_agent) {
        Device::Tablet
    } else if MOBILE_MARKER.is_match(user_agent) {
        Device::Mobile
    } else {
        Device::Desktop {
            touch: max_touch_points > 0,
        }
    }
}
