//! The scheduled-report job: ask an agent, format the answer as HTML and
//! mail it to the task's recipients.

pub mod callback;
pub mod error;
pub mod html;
pub mod mailer;

pub use {
    callback::ScheduledReport,
    error::{Error, Result},
    mailer::{EmailMessage, Mailer, SmtpMailer},
};
