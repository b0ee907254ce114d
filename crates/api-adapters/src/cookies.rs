use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use services::CookieAction;

/// Applies a service's cookie decision to the encrypted jar.
pub(crate) fn apply(jar: PrivateCookieJar, action: CookieAction) -> PrivateCookieJar {
    match action {
        CookieAction::Set {
            name,
            value,
            max_age,
        } => jar.add(
            Cookie::build((name, value))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .max_age(time::Duration::seconds(max_age.num_seconds()))
                .build(),
        ),
        CookieAction::Clear { name } => jar.remove(Cookie::build((name, "")).path("/").build()),
    }
}
