//! Input shapes accepted by the account and comment endpoints.

use domains::{CommentTarget, Result, ValidationErrors};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;

static USERNAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9\-_.]+$").expect("username pattern is valid"));

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

const RESERVED_USERNAMES: &[&str] = &[
    "admin", "super", "power", "learnhub", "moderator", "public", "dev", "alpha", "mail",
];

pub const PASSWORD_MIN_LENGTH: usize = 8;

fn check_username(errors: &mut ValidationErrors, username: &str) {
    let len = username.chars().count();
    if len < 3 {
        errors.push("username", "minLength", "must be at least 3 characters");
    } else if len > 50 {
        errors.push("username", "maxLength", "must be at most 50 characters");
    }
    if !USERNAME.is_match(username) {
        errors.push("username", "regex", "may only contain letters, numbers, dashes, underscores and periods");
    }
    if RESERVED_USERNAMES.contains(&username.to_lowercase().as_str()) {
        errors.push("username", "notIn", "is reserved");
    }
}

fn check_password(errors: &mut ValidationErrors, password: &str) {
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        errors.push("password", "minLength", "must be at least 8 characters");
    }
}

fn check_email(errors: &mut ValidationErrors, email: &str) {
    if !EMAIL.is_match(email) {
        errors.push("email", "email", "must be a valid email address");
    }
}

fn check_required(errors: &mut ValidationErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(field, "required", "is required");
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInInput {
    pub uid: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
    pub forward: Option<String>,
}

impl SignInInput {
    pub fn validate(&self) -> Result<()> {
        let mut errors = ValidationErrors::default();
        check_required(&mut errors, "uid", &self.uid);
        check_required(&mut errors, "password", &self.password);
        errors.into_result()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub forward: Option<String>,
}

impl SignUpInput {
    /// Validates and returns the input with the email trimmed.
    pub fn validate(mut self) -> Result<Self> {
        self.email = self.email.trim().to_string();
        let mut errors = ValidationErrors::default();
        check_username(&mut errors, &self.username);
        check_email(&mut errors, &self.email);
        check_password(&mut errors, &self.password);
        errors.into_result()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetInput {
    pub token: String,
    pub email: String,
    pub password: String,
}

impl PasswordResetInput {
    pub fn validate(mut self) -> Result<Self> {
        self.email = self.email.trim().to_string();
        let mut errors = ValidationErrors::default();
        check_required(&mut errors, "token", &self.token);
        check_required(&mut errors, "email", &self.email);
        check_password(&mut errors, &self.password);
        errors.into_result()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentInput {
    pub post_id: Option<Uuid>,
    pub discussion_id: Option<Uuid>,
    pub lesson_request_id: Option<Uuid>,
    pub root_parent_id: Option<Uuid>,
    pub reply_to: Option<Uuid>,
    pub body: String,
}

impl CommentInput {
    /// Validates the payload and classifies what it is attached to.
    pub fn target(&self) -> Result<CommentTarget> {
        let mut errors = ValidationErrors::default();
        check_required(&mut errors, "body", &self.body);

        let targets: Vec<CommentTarget> = [
            self.post_id.map(CommentTarget::Post),
            self.discussion_id.map(CommentTarget::Discussion),
            self.lesson_request_id.map(CommentTarget::LessonRequest),
        ]
        .into_iter()
        .flatten()
        .collect();

        if targets.len() != 1 {
            errors.push("postId", "required", "exactly one comment target is required");
        }
        errors.into_result()?;
        Ok(targets[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::AppError;

    fn sign_up(username: &str, email: &str, password: &str) -> SignUpInput {
        SignUpInput {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            forward: None,
        }
    }

    fn fields(err: AppError) -> Vec<String> {
        match err {
            AppError::Validation(v) => v.errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn sign_up_trims_email() {
        let input = sign_up("learner_1", "  a@b.co ", "longenough").validate().unwrap();
        assert_eq!(input.email, "a@b.co");
    }

    #[test]
    fn sign_up_reports_every_field() {
        let err = sign_up("ad", "nope", "short").validate().unwrap_err();
        assert_eq!(fields(err), vec!["username", "email", "password"]);
    }

    #[test]
    fn reserved_usernames_are_rejected_case_insensitively() {
        let err = sign_up("Moderator", "a@b.co", "longenough").validate().unwrap_err();
        assert_eq!(fields(err), vec!["username"]);
    }

    #[test]
    fn comment_needs_exactly_one_target() {
        let input = CommentInput {
            post_id: Some(Uuid::now_v7()),
            discussion_id: Some(Uuid::now_v7()),
            lesson_request_id: None,
            root_parent_id: None,
            reply_to: None,
            body: "<p>hi</p>".into(),
        };
        assert_eq!(fields(input.target().unwrap_err()), vec!["postId"]);
    }

    #[test]
    fn comment_target_is_classified() {
        let id = Uuid::now_v7();
        let input = CommentInput {
            post_id: None,
            discussion_id: Some(id),
            lesson_request_id: None,
            root_parent_id: None,
            reply_to: None,
            body: "hi".into(),
        };
        assert_eq!(input.target().unwrap(), CommentTarget::Discussion(id));
    }
}
