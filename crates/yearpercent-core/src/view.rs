use serde::Serialize;

use crate::locale::{self, Language, MessageKey};
use crate::progress::{Percentage, YearProgress, days_in_month};
use crate::share::SharePlatform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DayState {
    Past,
    Current,
    Future,
}

impl DayState {
    #[must_use]
    pub fn classify(cell_day_of_year: u32, today_day_of_year: u32) -> Self {
        if cell_day_of_year < today_day_of_year {
            DayState::Past
        } else if cell_day_of_year == today_day_of_year {
            DayState::Current
        } else {
            DayState::Future
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarCell {
    pub month: u32,
    pub day: u32,
    pub day_of_year: u32,
    pub state: DayState,
    /// `(month - 1) % 3`, only used to alternate month colors.
    pub band: u8,
    pub tooltip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressBarView {
    pub ratio: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShareControl {
    pub platform: SharePlatform,
    pub caption: String,
    pub aria_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LanguageOption {
    pub language: Language,
    pub caption: &'static str,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Controls {
    pub copy: String,
    pub export: String,
    pub share: Vec<ShareControl>,
    pub languages: Vec<LanguageOption>,
    pub hints: String,
}

/// Everything shown on screen for one progress snapshot in one language.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageView {
    pub language: Language,
    pub progress: YearProgress,
    pub title: String,
    pub headline: String,
    pub date_text: String,
    pub progress_text: String,
    pub bar: ProgressBarView,
    pub calendar: Vec<CalendarCell>,
    pub controls: Controls,
}

impl PageView {
    #[tracing::instrument(skip(progress), fields(year = progress.year, day = progress.day_of_year))]
    pub fn build(progress: &YearProgress, language: Language) -> Self {
        let params = progress_params(progress);

        Self {
            language,
            progress: *progress,
            title: locale::text(language, MessageKey::PageTitle).to_string(),
            headline: locale::format(language, MessageKey::Headline, &params),
            date_text: locale::format_date(language, progress.year, progress.month, progress.day),
            progress_text: locale::format(language, MessageKey::ProgressText, &params),
            bar: ProgressBarView {
                ratio: progress.percentage.ratio(),
                label: format!("{}%", progress.percentage),
            },
            calendar: build_calendar(progress, language),
            controls: build_controls(language),
        }
    }

    /// Calendar cells grouped by month, January first.
    pub fn months(&self) -> impl Iterator<Item = &[CalendarCell]> {
        self.calendar.chunk_by(|a, b| a.month == b.month)
    }
}

pub(crate) fn progress_params(progress: &YearProgress) -> Vec<(&'static str, String)> {
    vec![
        ("year", progress.year.to_string()),
        ("month", progress.month.to_string()),
        ("day", progress.day.to_string()),
        ("percentage", progress.percentage.to_string()),
        ("dayOfYear", progress.day_of_year.to_string()),
        ("daysInYear", progress.days_in_year.to_string()),
    ]
}

fn build_calendar(progress: &YearProgress, language: Language) -> Vec<CalendarCell> {
    let mut cells = Vec::with_capacity(progress.days_in_year as usize);
    let mut day_of_year = 1;

    for month in 1..=12 {
        for day in 1..=days_in_month(progress.year, month) {
            if day_of_year > progress.days_in_year {
                break;
            }

            let daily = Percentage::of(day_of_year, progress.days_in_year);
            let tooltip = locale::format(
                language,
                MessageKey::CalendarDayTooltip,
                &[
                    ("year", progress.year.to_string()),
                    ("month", month.to_string()),
                    ("day", day.to_string()),
                    ("dayOfYear", day_of_year.to_string()),
                    ("dailyPercentage", daily.to_string()),
                ],
            );

            cells.push(CalendarCell {
                month,
                day,
                day_of_year,
                state: DayState::classify(day_of_year, progress.day_of_year),
                band: ((month - 1) % 3) as u8,
                tooltip,
            });
            day_of_year += 1;
        }
    }

    cells
}

fn build_controls(language: Language) -> Controls {
    let share = SharePlatform::ALL
        .into_iter()
        .map(|platform| ShareControl {
            platform,
            caption: locale::text(language, platform.caption_key()).to_string(),
            aria_label: locale::format(
                language,
                MessageKey::ShareAriaLabel,
                &[("platform", platform.display_name().to_string())],
            ),
        })
        .collect();

    let languages = Language::ALL
        .into_iter()
        .map(|option| LanguageOption {
            language: option,
            caption: locale::text(option, MessageKey::LanguageName),
            active: option == language,
        })
        .collect();

    Controls {
        copy: locale::text(language, MessageKey::CopyButton).to_string(),
        export: locale::text(language, MessageKey::ExportButton).to_string(),
        share,
        languages,
        hints: locale::text(language, MessageKey::KeyHints).to_string(),
    }
}
