use super::{error_banner, escape, nav_bar, page};
use crate::models::{Todo, User};

fn todo_item(todo: &Todo, redirect: &str) -> String {
    let (class, checked, action) = if todo.completed {
        ("done", "true", "Mark as not done")
    } else {
        ("", "false", "Mark as done")
    };
    format!(
        r#"<li class="{class}">
    <form method="post" action="/todos/{id}/toggle">
        <input type="hidden" name="redirect" value="{redirect}">
        <button class="check" type="submit" role="checkbox" aria-checked="{checked}" aria-label="{action}: {text}"></button>
    </form>
    <span class="text">{text}</span>
    <a class="delete" href="/todos/{id}/delete" aria-label="Delete {text}">Delete</a>
</li>"#,
        id = todo.id,
        text = escape(&todo.text),
    )
}

pub fn todo_list<'a>(
    todos: impl IntoIterator<Item = &'a Todo>,
    redirect: &str,
    empty: &str,
) -> String {
    let items: String = todos
        .into_iter()
        .map(|todo| todo_item(todo, redirect))
        .collect();
    if items.is_empty() {
        format!(r#"<p class="empty">{}</p>"#, escape(empty))
    } else {
        format!(r#"<ul class="todo-list">{items}</ul>"#)
    }
}

pub fn home_page<'a>(
    user: &User,
    pending: impl IntoIterator<Item = &'a Todo>,
    completed: impl IntoIterator<Item = &'a Todo>,
    draft: &str,
    error: Option<&str>,
) -> String {
    let body = format!(
        r#"<div class="card">
    {nav}
    <header>
        <p class="eyebrow">Todo Studio</p>
        <h1>Organise today's work</h1>
        <p class="muted">What is left to do on top, finished work below.</p>
    </header>
    {banner}
    <form class="add-todo" method="post" action="/todos">
        <input type="text" name="text" value="{draft}" placeholder="What needs doing?" aria-label="New todo" required>
        <button type="submit" aria-label="Add todo">+</button>
    </form>
    <section class="todos">
        <h2>To do</h2>
        {pending}
    </section>
    <section class="todos">
        <h2>Done</h2>
        {completed}
    </section>
</div>"#,
        nav = nav_bar(user),
        banner = error_banner(error),
        draft = escape(draft),
        pending = todo_list(pending, "/", "Nothing left to do"),
        completed = todo_list(completed, "/", "Finished work shows up here"),
    );
    page("Todo Studio", &body)
}

pub fn confirm_delete_page(user: &User, todo: &Todo, error: Option<&str>) -> String {
    let body = format!(
        r#"<div class="card narrow">
    {nav}
    <header>
        <h1>Delete todo?</h1>
        <p class="muted">&ldquo;{text}&rdquo; will be removed permanently.</p>
    </header>
    {banner}
    <form method="post" action="/todos/{id}/delete" style="display:flex;gap:0.5rem;justify-content:center">
        <input type="hidden" name="confirm" value="true">
        <button class="danger" type="submit">Delete</button>
        <a class="delete" href="/" style="align-self:center">Cancel</a>
    </form>
</div>"#,
        nav = nav_bar(user),
        banner = error_banner(error),
        id = todo.id,
        text = escape(&todo.text),
    );
    page("Delete todo - Todo Studio", &body)
}
