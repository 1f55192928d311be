//! Donut chart of completed vs. pending todos.

use std::f64::consts::PI;

use serde::Serialize;

pub const RADIUS: f64 = 60.0;
pub const STROKE_WIDTH: u32 = 12;
pub const SIZE: u32 = 160;

const TRACK_COLOR: &str = "#e2e8f0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorTier {
    Strong,
    Mid,
    Low,
}

impl ColorTier {
    pub fn for_percentage(percentage: u8) -> Self {
        if percentage >= 80 {
            ColorTier::Strong
        } else if percentage >= 50 {
            ColorTier::Mid
        } else {
            ColorTier::Low
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            ColorTier::Strong => "#10b981",
            ColorTier::Mid => "#3b82f6",
            ColorTier::Low => "#f59e0b",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Completed,
    Pending,
}

/// Which donut region the pointer is over; at most one at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HoverState(Option<Section>);

impl HoverState {
    pub fn enter(&mut self, section: Section) {
        self.0 = Some(section);
    }

    pub fn leave(&mut self, section: Section) {
        if self.0 == Some(section) {
            self.0 = None;
        }
    }

    pub fn active(&self) -> Option<Section> {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompletionChart {
    pub total: u64,
    pub completed: u64,
}

impl CompletionChart {
    pub fn new(total: u64, completed: u64) -> Self {
        Self { total, completed }
    }

    pub fn pending(&self) -> u64 {
        self.total.saturating_sub(self.completed)
    }

    /// `round(completed / total * 100)`, 0 for an empty list.
    pub fn percentage(&self) -> u8 {
        rounded_percent(self.completed, self.total)
    }

    pub fn pending_percentage(&self) -> u8 {
        rounded_percent(self.pending(), self.total)
    }

    pub fn tier(&self) -> ColorTier {
        ColorTier::for_percentage(self.percentage())
    }

    pub fn circumference(&self) -> f64 {
        2.0 * PI * RADIUS
    }

    pub fn dash_offset(&self) -> f64 {
        let circumference = self.circumference();
        circumference - f64::from(self.percentage()) / 100.0 * circumference
    }

    pub fn render_svg(&self, hover: HoverState) -> String {
        let center = SIZE / 2;
        let tooltip = |section: Section, body: String| {
            let hidden = if hover.active() == Some(section) { "" } else { " hidden" };
            let name = match section {
                Section::Completed => "completed",
                Section::Pending => "pending",
            };
            format!(r#"<div class="chart-tooltip" data-tooltip="{name}"{hidden}>{body}</div>"#)
        };

        format!(
            r#"<div class="chart" data-chart>
  <svg width="{SIZE}" height="{SIZE}" viewBox="0 0 {SIZE} {SIZE}" class="donut">
    <g data-section="pending"><circle cx="{center}" cy="{center}" r="{RADIUS}" fill="none" stroke="{TRACK_COLOR}" stroke-width="{STROKE_WIDTH}"/></g>
    <g data-section="completed"><circle cx="{center}" cy="{center}" r="{RADIUS}" fill="none" stroke="{color}" stroke-width="{STROKE_WIDTH}" stroke-dasharray="{circumference:.2}" stroke-dashoffset="{offset:.2}" stroke-linecap="round" transform="rotate(-90 {center} {center})"/></g>
  </svg>
  <div class="chart-center"><strong>{percentage}%</strong><span>done</span></div>
  {completed_tip}
  {pending_tip}
</div>"#,
            color = self.tier().color(),
            circumference = self.circumference(),
            offset = self.dash_offset(),
            percentage = self.percentage(),
            completed_tip = tooltip(
                Section::Completed,
                format!(
                    "Completed <b>{}</b> &middot; {}%",
                    self.completed,
                    self.percentage()
                )
            ),
            pending_tip = tooltip(
                Section::Pending,
                format!(
                    "Pending <b>{}</b> &middot; {}%",
                    self.pending(),
                    self.pending_percentage()
                )
            ),
        )
    }
}

/// Integer round-half-up, matching what the percentage label shows.
fn rounded_percent(part: u64, whole: u64) -> u8 {
    if whole == 0 {
        return 0;
    }
    let percent = (part.saturating_mul(200) + whole) / (whole * 2);
    percent.min(100) as u8
}
