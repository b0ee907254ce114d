pub(crate) mod auth;
pub(crate) mod comments;
pub(crate) mod content;
pub(crate) mod engagement;
pub(crate) mod sessions;
