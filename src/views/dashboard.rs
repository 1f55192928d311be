use super::todos::todo_list;
use super::{error_banner, escape, nav_bar, page};
use crate::calendar::{format_iso, Calendar, DayBuckets, DayClick, WEEKDAY_LABELS};
use crate::chart::{CompletionChart, HoverState};
use crate::models::{MonthlyStat, Todo, User};
use crate::stats::Totals;

pub struct Dashboard<'a> {
    pub user: &'a User,
    pub totals: Totals,
    pub calendar: Calendar,
    pub buckets: &'a DayBuckets,
    pub monthly: &'a [MonthlyStat],
    pub recent: &'a [Todo],
    pub selected: Option<&'a DayClick>,
    pub error: Option<&'a str>,
}

pub fn dashboard_page(view: &Dashboard<'_>) -> String {
    let chart = CompletionChart::new(view.totals.total, view.totals.completed);
    let modal = view
        .selected
        .map(|click| date_modal(click, view.calendar))
        .unwrap_or_default();

    let body = format!(
        r#"<div class="card wide">
    {nav}
    <header>
        <p class="eyebrow">Dashboard</p>
        <h1>Welcome back!</h1>
        <p class="muted">Signed in as {email}</p>
    </header>
    {banner}
    <div class="grid-2">
        <div class="panel">
            <h2>Progress</h2>
            {chart}
            <div class="totals">
                <div><span class="muted">Total</span><strong>{total}</strong></div>
                <div><span class="muted">Done</span><strong>{completed}</strong></div>
                <div><span class="muted">Pending</span><strong>{pending}</strong></div>
            </div>
        </div>
        <div class="panel">
            {calendar}
        </div>
    </div>
    <div class="grid-2">
        <div class="panel">
            <h2>Monthly</h2>
            {monthly}
        </div>
        <div class="panel">
            <h2>Recent todos</h2>
            {recent}
        </div>
    </div>
</div>
{modal}"#,
        nav = nav_bar(view.user),
        email = escape(&view.user.email),
        banner = error_banner(view.error),
        chart = chart.render_svg(HoverState::default()),
        total = view.totals.total,
        completed = view.totals.completed,
        pending = view.totals.pending,
        calendar = calendar_grid(view.calendar, view.buckets),
        monthly = monthly_table(view.monthly),
        recent = todo_list(view.recent, "/dashboard", "No todos yet"),
    );
    page("Dashboard - Todo Studio", &body)
}

fn calendar_grid(calendar: Calendar, buckets: &DayBuckets) -> String {
    let cursor = format_iso(calendar.cursor());
    let header: String = WEEKDAY_LABELS
        .iter()
        .map(|label| format!("<th>{label}</th>"))
        .collect();

    let rows: String = calendar
        .weeks()
        .iter()
        .map(|week| {
            let cells: String = week
                .iter()
                .map(|cell| match cell.and_then(|day| calendar.date_for(day).map(|d| (day, d))) {
                    Some((day, date)) => {
                        let count = buckets.count_on(date);
                        let mut classes = Vec::new();
                        if count > 0 {
                            classes.push("has-todos");
                        }
                        if calendar.is_today(day) {
                            classes.push("today");
                        }
                        let badge = if count > 0 {
                            format!(r#"<span class="count">{count}</span>"#)
                        } else {
                            String::new()
                        };
                        format!(
                            r#"<td><a class="{classes}" href="/dashboard?cursor={cursor}&amp;date={date}">{day}{badge}</a></td>"#,
                            classes = classes.join(" "),
                            date = format_iso(date),
                        )
                    }
                    None => "<td></td>".to_string(),
                })
                .collect();
            format!("<tr>{cells}</tr>")
        })
        .collect();

    format!(
        r#"<div class="calendar-head">
    <a href="/dashboard?cursor={cursor}&amp;nav=prev" aria-label="Previous month">&larr;</a>
    <h2>{title}</h2>
    <a href="/dashboard?cursor={cursor}&amp;nav=next" aria-label="Next month">&rarr;</a>
</div>
<p style="text-align:center;margin:0 0 0.5rem"><a class="delete" href="/dashboard?cursor={cursor}&amp;nav=today">Today</a></p>
<table class="calendar">
    <thead><tr>{header}</tr></thead>
    <tbody>{rows}</tbody>
</table>"#,
        title = calendar.title(),
    )
}

fn monthly_table(stats: &[MonthlyStat]) -> String {
    if stats.is_empty() {
        return r#"<p class="empty">No monthly data yet</p>"#.to_string();
    }
    let rows: String = stats
        .iter()
        .map(|stat| {
            let flag = if stat.is_consistent() {
                ""
            } else {
                r#" <span title="completed exceeds total">&#9888;</span>"#
            };
            format!(
                "<tr><td>{month}</td><td>{completed}</td><td>{total}{flag}</td></tr>",
                month = escape(&stat.month),
                completed = stat.completed_todos,
                total = stat.total_todos,
            )
        })
        .collect();
    format!(
        r#"<table class="monthly">
    <thead><tr><th>Month</th><th>Done</th><th>Total</th></tr></thead>
    <tbody>{rows}</tbody>
</table>"#
    )
}

fn date_modal(click: &DayClick, calendar: Calendar) -> String {
    let weekday = WEEKDAY_LABELS[click.date.weekday().number_days_from_sunday() as usize];
    let items: String = click
        .todos
        .iter()
        .map(|todo| {
            let (class, mark) = if todo.completed {
                ("done", "&#10003;")
            } else {
                ("", "&#9744;")
            };
            format!(
                r#"<li class="{class}"><span>{mark}</span><span class="text">{text}</span></li>"#,
                text = escape(&todo.text),
            )
        })
        .collect();
    let list = if items.is_empty() {
        r#"<p class="empty">No todos on this date.</p>"#.to_string()
    } else {
        format!(r#"<ul class="todo-list">{items}</ul>"#)
    };

    format!(
        r#"<div class="modal-backdrop" role="dialog" aria-modal="true">
    <div class="modal">
        <div class="modal-head">
            <h2>{date} ({weekday})</h2>
            <a href="/dashboard?cursor={cursor}" aria-label="Close">&#10005;</a>
        </div>
        {list}
    </div>
</div>"#,
        date = format_iso(click.date),
        cursor = format_iso(calendar.cursor()),
    )
}
