//! Fixed extraction prompt.

use super::candidate::NOT_APPLICABLE_MARKER;
use crate::job::AppStatus;
use crate::mail::Mail;
use crate::model::ChatMessage;

/// Instruction describing the task.
#[must_use]
pub fn task_instruction() -> String {
    format!(
        "Is this document a job update or job application? If it is, please provide the \
         status, job title, company name and job id, if available. If it is not a job update \
         or job application, please ignore it and return {NOT_APPLICABLE_MARKER}."
    )
}

/// Instruction fixing the answer format and the allowed statuses.
#[must_use]
pub fn schema_instruction() -> String {
    let statuses = AppStatus::ALL
        .iter()
        .map(|s| format!("\"{s}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Please answer in the following JSON format:\n\
         {{ \"status\": \"status of the job application\",\n  \
         \"job\": \"job title\",\n  \
         \"company\": \"company name\",\n  \
         \"link\": \"posting link if available\",\n  \
         \"jobId\": \"job id\",\n  \
         \"reason\": \"optional short explanation\" }}\n\
         Provide the answer in JSON format only, no other text. \
         Make sure status is one of the following: {statuses}"
    )
}

/// Full message list for one extraction attempt on `mail`.
#[must_use]
pub fn build_messages(mail: &Mail) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(task_instruction()),
        ChatMessage::system(schema_instruction()),
        ChatMessage::user(mail.for_processing()),
    ]
}
