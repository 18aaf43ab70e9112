//! Contact form state and field validation. Sending is simulated.

use std::{collections::BTreeMap, fmt, time::Duration};

use thiserror::Error;
use tracing::{debug, info};

pub const SIMULATED_SEND_DELAY: Duration = Duration::from_millis(1500);
const MIN_MESSAGE_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContactField {
    Name,
    Email,
    Phone,
    Subject,
    Message,
}

impl ContactField {
    pub const ALL: [ContactField; 5] = [
        ContactField::Name,
        ContactField::Email,
        ContactField::Phone,
        ContactField::Subject,
        ContactField::Message,
    ];
}

impl fmt::Display for ContactField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContactField::Name => "name",
            ContactField::Email => "email",
            ContactField::Phone => "phone",
            ContactField::Subject => "subject",
            ContactField::Message => "message",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Name is required")]
    NameRequired,
    #[error("Email is required")]
    EmailRequired,
    #[error("Please enter a valid email address")]
    EmailInvalid,
    #[error("Please enter a valid phone number")]
    PhoneInvalid,
    #[error("Subject is required")]
    SubjectRequired,
    #[error("Message must be at least 10 characters")]
    MessageTooShort,
}

impl ValidationError {
    pub fn field(&self) -> ContactField {
        match self {
            ValidationError::NameRequired => ContactField::Name,
            ValidationError::EmailRequired | ValidationError::EmailInvalid => ContactField::Email,
            ValidationError::PhoneInvalid => ContactField::Phone,
            ValidationError::SubjectRequired => ContactField::Subject,
            ValidationError::MessageTooShort => ContactField::Message,
        }
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("{} field(s) need attention", .0.len())]
    Invalid(Vec<ValidationError>),
    #[error("a message is already being sent")]
    InProgress,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub subject: String,
    pub message: String,
    errors: BTreeMap<ContactField, ValidationError>,
    submitting: bool,
}

impl ContactForm {
    pub fn value(&self, field: ContactField) -> &str {
        match field {
            ContactField::Name => &self.name,
            ContactField::Email => &self.email,
            ContactField::Phone => &self.phone,
            ContactField::Subject => &self.subject,
            ContactField::Message => &self.message,
        }
    }

    /// Updates one field and clears its pending error.
    pub fn edit(&mut self, field: ContactField, value: impl Into<String>) {
        let slot = match field {
            ContactField::Name => &mut self.name,
            ContactField::Email => &mut self.email,
            ContactField::Phone => &mut self.phone,
            ContactField::Subject => &mut self.subject,
            ContactField::Message => &mut self.message,
        };
        *slot = value.into();
        self.errors.remove(&field);
    }

    pub fn error(&self, field: ContactField) -> Option<&ValidationError> {
        self.errors.get(&field)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.values()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// Every rule the current values break, in field order.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push(ValidationError::NameRequired);
        }
        let email = self.email.trim();
        if email.is_empty() {
            errors.push(ValidationError::EmailRequired);
        } else if !is_email(email) {
            errors.push(ValidationError::EmailInvalid);
        }
        let phone = self.phone.trim();
        if !phone.is_empty() && !is_phone(phone) {
            errors.push(ValidationError::PhoneInvalid);
        }
        if self.subject.trim().is_empty() {
            errors.push(ValidationError::SubjectRequired);
        }
        if self.message.trim().chars().count() < MIN_MESSAGE_CHARS {
            errors.push(ValidationError::MessageTooShort);
        }
        errors
    }

    pub async fn submit(&mut self) -> Result<(), SubmitError> {
        self.submit_after(SIMULATED_SEND_DELAY).await
    }

    /// Validates, waits `delay` in place of a network send, then resets the form.
    pub async fn submit_after(&mut self, delay: Duration) -> Result<(), SubmitError> {
        if self.submitting {
            return Err(SubmitError::InProgress);
        }
        let errors = self.validate();
        if !errors.is_empty() {
            debug!(count = errors.len(), "contact form rejected");
            self.errors = errors.iter().map(|e| (e.field(), e.clone())).collect();
            return Err(SubmitError::Invalid(errors));
        }

        let mut sending = Sending::begin(self);
        tokio::time::sleep(delay).await;
        info!(subject = %sending.0.subject.trim(), "contact message sent");
        *sending.0 = Self::default();
        Ok(())
    }
}

/// Marks the form as submitting until dropped, including when the submit
/// future is cancelled mid-send.
struct Sending<'a>(&'a mut ContactForm);

impl<'a> Sending<'a> {
    fn begin(form: &'a mut ContactForm) -> Self {
        form.submitting = true;
        Self(form)
    }
}

impl Drop for Sending<'_> {
    fn drop(&mut self) {
        self.0.submitting = false;
    }
}

fn is_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !host.ends_with('.') && tld.len() >= 2,
        None => false,
    }
}

fn is_phone(value: &str) -> bool {
    let len = value.chars().count();
    (7..=20).contains(&len)
        && value.chars().any(|c| c.is_ascii_digit())
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')'))
}
