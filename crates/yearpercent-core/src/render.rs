use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::locale::{Language, month_name};
use crate::state::{AppState, Control};
use crate::view::{CalendarCell, DayState, PageView};

const BAR_WIDTH: u32 = 40;
const MONTH_LABEL_WIDTH: usize = 5;
const BAND_CODES: [&str; 3] = ["34", "32", "33"];

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    raw: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
            raw: false,
        })
    }

    #[must_use]
    pub fn plain() -> Self {
        Self {
            color: false,
            raw: false,
        }
    }

    /// Raw terminal mode needs explicit carriage returns.
    #[must_use]
    pub fn with_raw_mode(mut self, raw: bool) -> Self {
        self.raw = raw;
        self
    }

    /// Writes the page for `state`, with any live control feedback in place of captions.
    #[tracing::instrument(skip(self, out, state), fields(language = %state.language))]
    pub fn render_page<W: Write>(&self, out: &mut W, state: &AppState) -> anyhow::Result<()> {
        let view = state.view();

        self.line(out, &self.paint(&view.title, "1;36"))?;
        self.line(out, "")?;
        self.line(out, &self.paint(&view.headline, "1"))?;
        self.line(out, &view.date_text)?;
        self.line(out, "")?;
        self.line(out, &self.bar(&view))?;
        self.line(out, &view.progress_text)?;
        self.line(out, "")?;

        for month in view.months() {
            let row = self.month_row(view.language, month);
            self.line(out, &row)?;
        }

        self.line(out, "")?;
        self.line(out, &self.controls(&view, state))?;

        let notices = [Control::Copy, Control::Export, Control::Share]
            .into_iter()
            .filter_map(|control| state.feedback(control))
            .filter_map(|feedback| feedback.notice(state.language));
        for notice in notices {
            self.line(out, &self.paint(&notice, "35"))?;
        }

        self.line(out, &self.paint(&view.controls.hints, "2"))?;
        out.flush()?;
        Ok(())
    }

    fn bar(&self, view: &PageView) -> String {
        let tenths = u32::from(view.progress.percentage.tenths());
        let filled = ((tenths * BAR_WIDTH + 500) / 1000).min(BAR_WIDTH) as usize;
        let empty = BAR_WIDTH as usize - filled;
        format!(
            "{}{} {}",
            self.paint(&"█".repeat(filled), "32"),
            self.paint(&"░".repeat(empty), "90"),
            view.bar.label
        )
    }

    fn month_row(&self, language: Language, cells: &[CalendarCell]) -> String {
        let Some(first) = cells.first() else {
            return String::new();
        };
        let label = match language {
            Language::En => month_name(first.month).chars().take(3).collect::<String>(),
            Language::ZhCn => format!("{}月", first.month),
        };

        let mut row = pad(&label, MONTH_LABEL_WIDTH);
        for cell in cells {
            let glyph = match cell.state {
                DayState::Past => self.paint("■", BAND_CODES[usize::from(cell.band) % 3]),
                DayState::Current => self.paint("◆", "1;31"),
                DayState::Future => self.paint("□", "90"),
            };
            row.push_str(&glyph);
        }
        row
    }

    fn controls(&self, view: &PageView, state: &AppState) -> String {
        let caption = |control: Control, default: &str| {
            state
                .feedback(control)
                .map(|feedback| self.paint(&feedback.caption(state.language), "1;35"))
                .unwrap_or_else(|| default.to_string())
        };

        let mut parts = vec![
            format!("[c] {}", caption(Control::Copy, &view.controls.copy)),
            format!("[e] {}", caption(Control::Export, &view.controls.export)),
        ];

        match state.feedback(Control::Share) {
            Some(feedback) => parts.push(self.paint(&feedback.caption(state.language), "1;35")),
            None => {
                for (key, share) in ["x", "w"].iter().zip(&view.controls.share) {
                    parts.push(format!("[{key}] {}", share.caption));
                }
            }
        }

        let languages = view
            .controls
            .languages
            .iter()
            .map(|option| {
                if option.active {
                    format!("[{}]", option.caption)
                } else {
                    option.caption.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" / ");
        parts.push(format!("[l] {languages}"));

        parts.join("  ")
    }

    fn line<W: Write>(&self, out: &mut W, text: &str) -> io::Result<()> {
        if self.raw {
            write!(out, "{text}\r\n")
        } else {
            writeln!(out, "{text}")
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn pad(text: &str, width: usize) -> String {
    let visible = UnicodeWidthStr::width(text);
    format!("{text}{}", " ".repeat(width.saturating_sub(visible)))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::Renderer;
    use crate::locale::Language;
    use crate::share::ShareFormatter;
    use crate::state::{Action, AppState, update};

    fn state(language: Language) -> AppState {
        let today = NaiveDate::from_ymd_opt(2024, 3, 5).expect("valid date");
        AppState::new(language, today, ShareFormatter::default())
    }

    fn render(renderer: &Renderer, state: &AppState) -> String {
        let mut out = Vec::new();
        renderer.render_page(&mut out, state).expect("render");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn plain_page_has_headline_bar_and_twelve_months() {
        let text = render(&Renderer::plain(), &state(Language::En));
        assert!(text.contains("The year 2024 is 17.8% over"));
        assert!(text.contains("March 5, 2024"));
        assert!(text.contains("17.8%"));
        assert!(!text.contains('\x1b'));

        let month_rows = text.lines().filter(|l| l.contains('■') || l.contains('□')).count();
        assert_eq!(month_rows, 12);

        let march = text.lines().find(|l| l.starts_with("Mar  ")).expect("march row");
        assert_eq!(march.matches('■').count(), 4);
        assert_eq!(march.matches('◆').count(), 1);
        assert_eq!(march.matches('□').count(), 26);
    }

    #[test]
    fn chinese_labels_are_padded_by_display_width() {
        let text = render(&Renderer::plain(), &state(Language::ZhCn));
        let jan = text.lines().find(|l| l.starts_with("1月")).expect("jan row");
        assert!(jan.starts_with("1月  ■"));
        assert!(text.contains("[中文]"));
    }

    #[test]
    fn feedback_replaces_control_caption() {
        let mut state = state(Language::En);
        update(&mut state, Action::CopyRequested);
        update(&mut state, Action::CopyFinished { ok: false });
        let text = render(&Renderer::plain(), &state);
        assert!(text.contains("[c] Copy Failed!"));
        assert!(!text.contains("Copy Text"));
        assert!(text.contains("Copy failed, please copy the content manually."));
    }

    #[test]
    fn raw_mode_uses_crlf() {
        let text = render(&Renderer::plain().with_raw_mode(true), &state(Language::En));
        assert!(text.lines().all(|line| line.is_empty() || line.ends_with('\r')));
    }
}
