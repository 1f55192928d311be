use super::{error_banner, escape, page};

pub fn sign_in_page(email: &str, error: Option<&str>) -> String {
    let body = format!(
        r#"<div class="card narrow">
    <header>
        <h1>Sign in</h1>
        <p class="muted">Enter your email and password to sign in</p>
    </header>
    {banner}
    <form class="stack" method="post" action="/signin">
        <label for="email">Email</label>
        <input id="email" name="email" type="email" value="{email}" placeholder="example@email.com" autocomplete="email" required>
        <label for="password">Password</label>
        <input id="password" name="password" type="password" placeholder="Enter your password" autocomplete="current-password" required>
        <button class="primary" type="submit">Sign in</button>
    </form>
    <p class="muted" style="text-align:center">No account yet? <a href="/signup">Sign up</a></p>
</div>"#,
        banner = error_banner(error),
        email = escape(email),
    );
    page("Sign in - Todo Studio", &body)
}

pub fn sign_up_page(email: &str, error: Option<&str>) -> String {
    let body = format!(
        r#"<div class="card narrow">
    <header>
        <p class="eyebrow">Sign up</p>
        <h1>Create an account</h1>
        <p class="muted">Enter an email and password to create your account</p>
    </header>
    {banner}
    <form class="stack" method="post" action="/signup">
        <label for="email">Email</label>
        <input id="email" name="email" type="email" value="{email}" placeholder="example@email.com" autocomplete="email" required>
        <label for="password">Password</label>
        <input id="password" name="password" type="password" placeholder="At least 6 characters" minlength="6" autocomplete="new-password" required>
        <label for="confirm_password">Confirm password</label>
        <input id="confirm_password" name="confirm_password" type="password" placeholder="Repeat your password" minlength="6" autocomplete="new-password" required>
        <button class="primary" type="submit">Sign up</button>
    </form>
    <p class="muted" style="text-align:center">Already have an account? <a href="/signin">Sign in</a></p>
</div>"#,
        banner = error_banner(error),
        email = escape(email),
    );
    page("Sign up - Todo Studio", &body)
}

pub fn sign_up_pending_page(email: &str) -> String {
    let body = format!(
        r#"<div class="card narrow">
    <header>
        <p class="eyebrow">Sign up</p>
        <h1>Check your inbox</h1>
    </header>
    <div class="banner success" role="alert">
        A confirmation link was sent to {email}. Open it to activate your account.
    </div>
    <p class="muted" style="text-align:center"><a href="/signin">Back to sign in</a></p>
</div>"#,
        email = escape(email),
    );
    page("Sign up - Todo Studio", &body)
}
