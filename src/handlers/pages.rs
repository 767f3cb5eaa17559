use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Result};
use serde_json::json;

use crate::flow::AuthController;
use crate::utils::responses::ResponseBuilder;

/// Message shown for any failed password login
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid email or password";

/// Login page endpoint
///
/// # Errors
/// Infallible; the `Result` matches the other handlers
pub async fn login_page(controller: web::Data<AuthController>) -> Result<HttpResponse> {
    Ok(ResponseBuilder::html(
        StatusCode::OK,
        render_login_page(&controller, None),
    ))
}

/// Landing page for signed-in users
///
/// # Errors
/// Infallible; the `Result` matches the other handlers
pub async fn welcome(
    req: HttpRequest,
    controller: web::Data<AuthController>,
) -> Result<HttpResponse> {
    let Some(session) = controller.sessions().read(&req) else {
        return Ok(ResponseBuilder::redirect("/").build());
    };
    Ok(ResponseBuilder::html(
        StatusCode::OK,
        render_welcome_page(&session.display_name),
    ))
}

/// Health check endpoint
///
/// # Errors
/// Infallible; the `Result` matches the other handlers
pub async fn health() -> Result<HttpResponse> {
    Ok(ResponseBuilder::ok().json(&json!({
        "status": "ok",
        "message": "aurora-gate is running",
        "version": crate::VERSION,
    })))
}

/// Escape text for inclusion in HTML element content or a quoted attribute
#[must_use]
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Render the login page, optionally with an error banner
#[must_use]
pub fn render_login_page(controller: &AuthController, error: Option<&str>) -> String {
    let error_banner = error.map_or_else(String::new, |message| {
        format!(
            r#"<div class="error" role="alert">{}</div>"#,
            escape_html(message)
        )
    });

    let provider_button = if controller.google_enabled() {
        format!(
            r#"<a href="/api/authentication/login" class="provider-button provider-google">
                    <span>Continue with {}</span>
                </a>
                <div class="divider"><span>or</span></div>"#,
            escape_html(controller.provider_display_name())
        )
    } else {
        String::new()
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Sign In</title>
    <style>{styles}</style>
</head>
<body>
    <div class="container">
        <div class="login-box">
            <h1>Sign In</h1>
            {error_banner}
            <div class="button-container">
                {provider_button}
            </div>
            <form method="post" action="/login/email">
                <label for="email">Email</label>
                <input id="email" name="email" type="email" autocomplete="username" required>
                <label for="password">Password</label>
                <input id="password" name="password" type="password" autocomplete="current-password" required>
                <button type="submit">Sign in</button>
            </form>
        </div>
    </div>
</body>
</html>"#,
        styles = page_styles(),
    )
}

/// Render the landing page greeting `name`
#[must_use]
pub fn render_welcome_page(name: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Welcome</title>
    <style>{styles}</style>
</head>
<body>
    <div class="container">
        <div class="login-box">
            <h1>Welcome, {name}!</h1>
            <form method="post" action="/logout">
                <button type="submit">Sign out</button>
            </form>
        </div>
    </div>
</body>
</html>"#,
        styles = page_styles(),
        name = escape_html(name),
    )
}

const fn page_styles() -> &'static str {
    r"
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, sans-serif;
            background: linear-gradient(135deg, #f5f7fa 0%, #c3cfe2 100%);
            min-height: 100vh;
            display: flex;
            align-items: center;
            justify-content: center;
            padding: 20px;
        }
        .container { width: 100%; max-width: 400px; }
        .login-box {
            background: white;
            border-radius: 10px;
            box-shadow: 0 14px 28px rgba(0,0,0,0.12), 0 10px 10px rgba(0,0,0,0.08);
            padding: 40px;
        }
        h1 { color: #333; font-size: 28px; font-weight: 600; text-align: center; margin-bottom: 24px; }
        .error {
            background: #fdecea;
            color: #b3261e;
            border-radius: 6px;
            padding: 10px 14px;
            margin-bottom: 20px;
            text-align: center;
        }
        .button-container { display: flex; flex-direction: column; gap: 15px; margin-bottom: 20px; }
        .provider-button {
            display: flex;
            align-items: center;
            justify-content: center;
            padding: 12px 20px;
            border-radius: 6px;
            text-decoration: none;
            font-weight: 500;
            font-size: 16px;
        }
        .provider-google { background: #4285f4; color: white; }
        .provider-google:hover { background: #3367d6; }
        .divider { text-align: center; color: #999; font-size: 14px; }
        form { display: flex; flex-direction: column; gap: 8px; }
        label { color: #555; font-size: 14px; }
        input { padding: 10px 12px; border: 1px solid #ccc; border-radius: 6px; font-size: 16px; }
        button {
            margin-top: 12px;
            padding: 12px 20px;
            border: none;
            border-radius: 6px;
            background: #333;
            color: white;
            font-size: 16px;
            cursor: pointer;
        }
    "
}
