use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::Serialize;
use url::Url;

use crate::locale::{self, Language, MessageKey};
use crate::progress::{Percentage, YearProgress};
use crate::view::progress_params;

pub const DEFAULT_SITE_URL: &str = "www.yearpercent.xyz";
pub const TEXT_BAR_WIDTH: usize = 20;
pub const BAR_FILLED: char = '▓';
pub const BAR_EMPTY: char = '░';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SharePlatform {
    X,
    Weibo,
}

impl SharePlatform {
    pub const ALL: [SharePlatform; 2] = [SharePlatform::X, SharePlatform::Weibo];

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            SharePlatform::X => "X",
            SharePlatform::Weibo => "Weibo",
        }
    }

    #[must_use]
    pub fn caption_key(self) -> MessageKey {
        match self {
            SharePlatform::X => MessageKey::ShareXButton,
            SharePlatform::Weibo => MessageKey::ShareWeiboButton,
        }
    }

    fn endpoint(self) -> (&'static str, &'static str) {
        match self {
            SharePlatform::X => ("https://twitter.com/intent/tweet", "text"),
            SharePlatform::Weibo => ("http://service.weibo.com/share/share.php", "title"),
        }
    }

    /// The platform's share endpoint carrying `text` as its single encoded parameter.
    pub fn share_url(self, text: &str) -> Result<Url, url::ParseError> {
        let (base, param) = self.endpoint();
        Url::parse_with_params(base, &[(param, text)])
    }
}

impl fmt::Display for SharePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for SharePlatform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" | "twitter" => Ok(SharePlatform::X),
            "weibo" => Ok(SharePlatform::Weibo),
            other => Err(anyhow!("unknown share platform: {other} (expected x or weibo)")),
        }
    }
}

/// Twenty-character block bar, filled blocks rounded half-up.
#[must_use]
pub fn text_bar(percentage: Percentage) -> String {
    let filled = ((usize::from(percentage.tenths()) * TEXT_BAR_WIDTH + 500) / 1000).min(TEXT_BAR_WIDTH);
    let mut bar = String::with_capacity(TEXT_BAR_WIDTH * BAR_FILLED.len_utf8());
    bar.extend(std::iter::repeat_n(BAR_FILLED, filled));
    bar.extend(std::iter::repeat_n(BAR_EMPTY, TEXT_BAR_WIDTH - filled));
    bar
}

/// Builds the copy and share texts for one site URL.
#[derive(Debug, Clone)]
pub struct ShareFormatter {
    site_url: String,
}

impl Default for ShareFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_SITE_URL)
    }
}

impl ShareFormatter {
    #[must_use]
    pub fn new(site_url: impl Into<String>) -> Self {
        Self {
            site_url: site_url.into(),
        }
    }

    #[must_use]
    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    /// `▓▓▓░░… <summary> <site>`
    #[must_use]
    pub fn copy_text(&self, progress: &YearProgress, language: Language) -> String {
        let summary = locale::format(language, MessageKey::CopySummary, &progress_params(progress));
        format!("{} {summary} {}", text_bar(progress.percentage), self.site_url)
    }

    /// Headline followed by the site URL.
    #[must_use]
    pub fn share_text(&self, progress: &YearProgress, language: Language) -> String {
        let headline = locale::format(language, MessageKey::Headline, &progress_params(progress));
        format!("{headline} {}", self.site_url)
    }
}

#[must_use]
pub fn build_copy_text(progress: &YearProgress, language: Language) -> String {
    ShareFormatter::default().copy_text(progress, language)
}

#[must_use]
pub fn build_share_text(progress: &YearProgress, language: Language) -> String {
    ShareFormatter::default().share_text(progress, language)
}
