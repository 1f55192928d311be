//! Server-rendered pages.

pub mod auth;
pub mod dashboard;
pub mod todos;

use crate::models::User;

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
    <link rel="stylesheet" href="/static/style.css">
</head>
<body>
<main>
{body}
</main>
<script src="/static/app.js"></script>
</body>
</html>"#,
        title = escape(title),
    )
}

pub fn nav_bar(user: &User) -> String {
    format!(
        r#"<nav>
    <span class="muted">{email}</span>
    <a href="/" aria-label="Home">Home</a>
    <a href="/dashboard" aria-label="Dashboard">Dashboard</a>
    <form method="post" action="/signout"><button type="submit">Sign out</button></form>
</nav>"#,
        email = escape(&user.email),
    )
}

/// Inline, non-blocking message; empty when there is nothing to say.
pub fn error_banner(message: Option<&str>) -> String {
    match message {
        Some(message) => format!(
            r#"<div class="banner error" role="alert">{}</div>"#,
            escape(message)
        ),
        None => String::new(),
    }
}
