//! Two hardcoded locale bundles and `{name}` placeholder substitution.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_LANGUAGE: Language = Language::ZhCn;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Language {
    #[serde(rename = "en")]
    En,
    #[default]
    #[serde(rename = "zh-CN")]
    ZhCn,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::En, Language::ZhCn];

    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::ZhCn => "zh-CN",
        }
    }

    /// Recognizes `en` and `zh-CN`, ignoring ASCII case.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        Self::ALL
            .into_iter()
            .find(|lang| lang.tag().eq_ignore_ascii_case(tag))
    }

    /// Like [`Language::parse`], but unknown tags fall back to the default bundle.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        Self::parse(tag).unwrap_or_else(|| {
            warn!(
                tag,
                fallback = DEFAULT_LANGUAGE.tag(),
                "language not found, using default"
            );
            DEFAULT_LANGUAGE
        })
    }

    #[must_use]
    pub fn toggle(self) -> Self {
        match self {
            Language::En => Language::ZhCn,
            Language::ZhCn => Language::En,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| anyhow::anyhow!("unsupported language: {s} (expected en or zh-CN)"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    PageTitle,
    Headline,
    ProgressText,
    DayProgressText,
    CopyButton,
    CopySuccess,
    CopyError,
    ExportButton,
    Exporting,
    Exported,
    ExportError,
    ExportSuccessNotice,
    ExportErrorNotice,
    ShareXButton,
    ShareWeiboButton,
    ShareAriaLabel,
    CalendarDayTooltip,
    CopiedContentTitle,
    CopySummary,
    SharePrompt,
    OpenBlocked,
    ManualCopyPrompt,
    ToolName,
    ShareHashTag,
    LanguageName,
    KeyHints,
}

fn template(language: Language, key: MessageKey) -> &'static str {
    use MessageKey::*;

    match language {
        Language::En => match key {
            PageTitle => "Year Progress",
            Headline => "The year {year} is {percentage}% over",
            ProgressText => "{percentage}% of the year has passed ({dayOfYear}/{daysInYear} days)",
            DayProgressText => "{dayOfYear}/{daysInYear} days",
            CopyButton => "Copy Text",
            CopySuccess => "Copied!",
            CopyError => "Copy Failed!",
            ExportButton => "Export Image",
            Exporting => "Exporting...",
            Exported => "Exported!",
            ExportError => "Export Failed!",
            ExportSuccessNotice => "Image saved to {path}",
            ExportErrorNotice => "Export failed. Please try again.",
            ShareXButton => "Share on X",
            ShareWeiboButton => "Share on Weibo",
            ShareAriaLabel => "Share on {platform}",
            CalendarDayTooltip => "{month}/{day}/{year} (Day {dayOfYear}, {dailyPercentage}%)",
            CopiedContentTitle => "Year Progress",
            CopySummary => "Year is {percentage}% past",
            SharePrompt => "Content copied! Please paste it into your social media.",
            OpenBlocked => "Could not open the browser. Try the copy function instead.",
            ManualCopyPrompt => "Copy failed, please copy the content manually.",
            ToolName => "Year Progress Visualization Tool",
            ShareHashTag => "#YearProgress",
            LanguageName => "English",
            KeyHints => "[c] copy  [e] export  [x] X  [w] Weibo  [l] language  [q] quit",
        },
        Language::ZhCn => match key {
            PageTitle => "年度进度",
            Headline => "{year} 年已过 {percentage}%",
            ProgressText => "今年已过 {percentage}% (第 {dayOfYear} 天 / 共 {daysInYear} 天)",
            DayProgressText => "第 {dayOfYear} 天 / 共 {daysInYear} 天",
            CopyButton => "复制纯文本",
            CopySuccess => "复制成功!",
            CopyError => "复制失败!",
            ExportButton => "导出为图片",
            Exporting => "正在导出...",
            Exported => "已导出!",
            ExportError => "导出失败!",
            ExportSuccessNotice => "图片已保存到 {path}",
            ExportErrorNotice => "导出失败，请重试。",
            ShareXButton => "分享到 X",
            ShareWeiboButton => "分享到微博",
            ShareAriaLabel => "分享到 {platform}",
            CalendarDayTooltip => "{year} 年 {month} 月 {day} 日 (年度第 {dayOfYear} 天, 当日进度 {dailyPercentage}%)",
            CopiedContentTitle => "年度进度",
            CopySummary => "今年已过 {percentage}%",
            SharePrompt => "内容已复制！请将其粘贴到您的社交媒体。",
            OpenBlocked => "无法打开浏览器！请尝试使用复制功能。",
            ManualCopyPrompt => "复制失败，请手动复制内容。",
            ToolName => "年度进度可视化工具",
            ShareHashTag => "#年度进度",
            LanguageName => "中文",
            KeyHints => "[c] 复制  [e] 导出  [x] X  [w] 微博  [l] 语言  [q] 退出",
        },
    }
}

/// Renders `key` in `language`, substituting every `{name}` found in `params`.
#[must_use]
pub fn format(language: Language, key: MessageKey, params: &[(&str, String)]) -> String {
    substitute(template(language, key), params)
}

/// String-tag entry point; unknown tags use the `zh-CN` bundle.
#[must_use]
pub fn format_tag(tag: &str, key: MessageKey, params: &[(&str, String)]) -> String {
    format(Language::from_tag(tag), key, params)
}

#[must_use]
pub fn text(language: Language, key: MessageKey) -> &'static str {
    template(language, key)
}

/// Replaces every occurrence of each known placeholder. Unknown `{name}`s stay verbatim.
#[must_use]
pub fn substitute(template: &str, params: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len() + 16);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };

        let name = &after[..close];
        match params.iter().find(|(key, _)| *key == name) {
            Some((_, value)) => out.push_str(value),
            None => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

/// `2024 年 3 月 5 日` or `March 5, 2024`.
#[must_use]
pub fn format_date(language: Language, year: i32, month: u32, day: u32) -> String {
    match language {
        Language::ZhCn => format!("{year} 年 {month} 月 {day} 日"),
        Language::En => format!("{} {day}, {year}", month_name(month)),
    }
}

#[must_use]
pub fn month_name(month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|idx| MONTH_NAMES.get(idx as usize))
        .copied()
        .unwrap_or("")
}
