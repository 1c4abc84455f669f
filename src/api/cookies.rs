// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! `Set-Cookie` values for the tokens carried between requests.

use axum::{http::header::SET_COOKIE, response::AppendHeaders};
use chrono::Duration;

use crate::auth::extractor::{
    ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE, SESSION_TOKEN_COOKIE, STEP_UP_TOKEN_COOKIE,
};
use crate::config::TokenLifetimes;
use crate::tokens::IssuedTokens;

pub type SetCookies = AppendHeaders<Vec<(axum::http::HeaderName, String)>>;

pub fn set_cookie(name: &str, value: &str, max_age: Duration) -> String {
    format!(
        "{name}={value}; Path=/; HttpOnly; Secure; SameSite=Lax; Max-Age={}",
        max_age.num_seconds().max(0)
    )
}

pub fn clear_cookie(name: &str) -> String {
    set_cookie(name, "", Duration::zero())
}

/// Cookies for a freshly issued Access/Refresh (and StepUp) set.
pub fn session_cookies(tokens: &IssuedTokens, lifetimes: &TokenLifetimes) -> SetCookies {
    let mut cookies = vec![
        (
            SET_COOKIE,
            set_cookie(ACCESS_TOKEN_COOKIE, &tokens.access_token, lifetimes.access),
        ),
        (
            SET_COOKIE,
            set_cookie(REFRESH_TOKEN_COOKIE, &tokens.refresh_token, lifetimes.refresh),
        ),
    ];
    if let Some(step_up) = &tokens.step_up_token {
        cookies.push((
            SET_COOKIE,
            set_cookie(STEP_UP_TOKEN_COOKIE, step_up, lifetimes.step_up),
        ));
    }
    AppendHeaders(cookies)
}

pub fn logout_cookies() -> SetCookies {
    AppendHeaders(
        [
            ACCESS_TOKEN_COOKIE,
            REFRESH_TOKEN_COOKIE,
            STEP_UP_TOKEN_COOKIE,
            SESSION_TOKEN_COOKIE,
        ]
        .into_iter()
        .map(|name| (SET_COOKIE, clear_cookie(name)))
        .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_attributes() {
        assert_eq!(
            set_cookie("access_token", "abc", Duration::seconds(900)),
            "access_token=abc; Path=/; HttpOnly; Secure; SameSite=Lax; Max-Age=900"
        );
        assert!(clear_cookie("refresh_token").ends_with("Max-Age=0"));
    }

    #[test]
    fn step_up_cookie_only_when_issued() {
        let mut tokens = IssuedTokens {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            step_up_token: None,
            expires_in: 900,
        };
        let AppendHeaders(cookies) = session_cookies(&tokens, &TokenLifetimes::default());
        assert_eq!(cookies.len(), 2);

        tokens.step_up_token = Some("s".to_string());
        let AppendHeaders(cookies) = session_cookies(&tokens, &TokenLifetimes::default());
        assert_eq!(cookies.len(), 3);
        assert!(cookies[2].1.starts_with("step_up_token=s;"));
    }
}
