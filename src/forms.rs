//! Application forms
//!
//! A guild defines form templates; members answer them through a modal and
//! moderators review each submission once.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::error::UserFacing;

/// A modal holds at most five inputs
pub const MAX_QUESTIONS: usize = 5;
/// Discord's limit for input labels
pub const MAX_LABEL_LEN: usize = 45;
pub const MAX_FORM_NAME_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum FormError {
    #[error("Form not found: {0}")]
    NotFound(String),

    #[error("A form named {0} already exists")]
    NameTaken(String),

    #[error("Invalid form name: {0}")]
    InvalidName(String),

    #[error("Forms hold at most 5 questions")]
    TooManyQuestions,

    #[error("Question labels must be 1 to 45 characters")]
    LabelTooLong,

    #[error("Form {0} has no questions")]
    NoQuestions(String),

    #[error("No question {0}")]
    QuestionNotFound(usize),

    #[error("Expected {expected} answers, got {got}")]
    AnswerCount { expected: usize, got: usize },

    #[error("Question {0} requires an answer")]
    MissingAnswer(usize),

    #[error("Submission not found: {0}")]
    SubmissionNotFound(String),

    #[error("Submission already {0}")]
    AlreadyReviewed(SubmissionState),
}

impl UserFacing for FormError {
    fn title(&self) -> String {
        match self {
            Self::AnswerCount { .. } | Self::MissingAnswer(_) => "Application incomplete",
            Self::SubmissionNotFound(_) | Self::AlreadyReviewed(_) => "Review failed",
            _ => "Form problem",
        }
        .to_string()
    }

    fn message(&self) -> String {
        format!("{self}.")
    }

    fn remedy(&self) -> Option<String> {
        match self {
            Self::NotFound(_) => Some("See the available forms with `/form list`.".to_string()),
            Self::NoQuestions(_) => {
                Some("Add questions with `/form add_question` first.".to_string())
            }
            _ => None,
        }
    }
}

/// Input style of a question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, poise::ChoiceParameter)]
pub enum QuestionStyle {
    Short,
    Paragraph,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub label: String,
    pub style: QuestionStyle,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormTemplate {
    pub id: String,
    pub guild_id: u64,
    pub name: String,
    pub title: String,
    pub review_channel_id: Option<u64>,
    pub questions: Vec<Question>,
    pub created_by: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubmissionState {
    Pending,
    Accepted,
    Rejected,
}

impl std::fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Accepted => write!(f, "Accepted"),
            Self::Rejected => write!(f, "Rejected"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub form_id: String,
    pub guild_id: u64,
    pub user_id: u64,
    pub answers: Vec<String>,
    pub state: SubmissionState,
    pub submitted_at: DateTime<Utc>,
    pub reviewer_id: Option<u64>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Submission {
    fn review(&mut self, reviewer_id: u64, accept: bool) -> Result<(), FormError> {
        if self.state != SubmissionState::Pending {
            return Err(FormError::AlreadyReviewed(self.state));
        }
        let from = self.state;
        self.state = if accept {
            SubmissionState::Accepted
        } else {
            SubmissionState::Rejected
        };
        self.reviewer_id = Some(reviewer_id);
        self.reviewed_at = Some(Utc::now());

        info!(
            submission_id = %self.id,
            reviewer_id = %reviewer_id,
            from = %from,
            to = %self.state,
            "Submission reviewed"
        );
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct FormStore {
    templates: Arc<DashMap<String, FormTemplate>>,
    submissions: Arc<DashMap<String, Submission>>,
    create_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for FormStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormStore")
            .field("templates", &self.templates.len())
            .field("submissions", &self.submissions.len())
            .finish()
    }
}

impl FormStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns an error for blank or overlong names and names already used
    /// in the guild
    pub fn create(
        &self,
        guild_id: u64,
        name: &str,
        title: &str,
        review_channel_id: Option<u64>,
        created_by: u64,
    ) -> Result<FormTemplate, FormError> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_FORM_NAME_LEN {
            return Err(FormError::InvalidName(name.to_string()));
        }
        // Name lookup and insert happen under one lock
        let _guard = self.create_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.find(guild_id, name).is_some() {
            return Err(FormError::NameTaken(name.to_string()));
        }

        let title = title.trim();
        let form = FormTemplate {
            id: Uuid::new_v4().to_string(),
            guild_id,
            name: name.to_string(),
            title: if title.is_empty() { name } else { title }.to_string(),
            review_channel_id,
            questions: Vec::new(),
            created_by,
            created_at: Utc::now(),
        };
        self.templates.insert(form.id.clone(), form.clone());

        info!(form_id = %form.id, guild_id = %guild_id, name = %form.name, "Form created");
        Ok(form)
    }

    /// Look up a form by name within a guild
    #[must_use]
    pub fn find(&self, guild_id: u64, name: &str) -> Option<FormTemplate> {
        let name = name.trim();
        self.templates
            .iter()
            .find(|entry| entry.guild_id == guild_id && entry.name.eq_ignore_ascii_case(name))
            .map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn get(&self, form_id: &str) -> Option<FormTemplate> {
        self.templates.get(form_id).map(|entry| entry.value().clone())
    }

    /// A guild's forms ordered by name
    #[must_use]
    pub fn list(&self, guild_id: u64) -> Vec<FormTemplate> {
        let mut forms: Vec<FormTemplate> = self
            .templates
            .iter()
            .filter(|entry| entry.guild_id == guild_id)
            .map(|entry| entry.value().clone())
            .collect();
        forms.sort_by(|a, b| a.name.cmp(&b.name));
        forms
    }

    fn update(
        &self,
        guild_id: u64,
        name: &str,
        apply: impl FnOnce(&mut FormTemplate) -> Result<(), FormError>,
    ) -> Result<FormTemplate, FormError> {
        let form_id = self
            .find(guild_id, name)
            .ok_or_else(|| FormError::NotFound(name.to_string()))?
            .id;
        let mut form = self
            .templates
            .get_mut(&form_id)
            .ok_or_else(|| FormError::NotFound(name.to_string()))?;
        apply(&mut *form)?;
        Ok(form.clone())
    }

    /// # Errors
    /// Returns an error if the form is full or the label is blank or too long
    pub fn add_question(
        &self,
        guild_id: u64,
        name: &str,
        label: &str,
        style: QuestionStyle,
        required: bool,
    ) -> Result<FormTemplate, FormError> {
        let label = label.trim();
        if label.is_empty() || label.chars().count() > MAX_LABEL_LEN {
            return Err(FormError::LabelTooLong);
        }
        self.update(guild_id, name, |form| {
            if form.questions.len() >= MAX_QUESTIONS {
                return Err(FormError::TooManyQuestions);
            }
            form.questions.push(Question {
                label: label.to_string(),
                style,
                required,
            });
            Ok(())
        })
    }

    /// Remove a question by its 1-based number
    ///
    /// # Errors
    /// Returns an error for unknown forms or question numbers
    pub fn remove_question(
        &self,
        guild_id: u64,
        name: &str,
        number: usize,
    ) -> Result<FormTemplate, FormError> {
        self.update(guild_id, name, |form| {
            if number == 0 || number > form.questions.len() {
                return Err(FormError::QuestionNotFound(number));
            }
            form.questions.remove(number - 1);
            Ok(())
        })
    }

    /// Delete a form; its submissions stay for the record
    ///
    /// # Errors
    /// Returns `FormError::NotFound` for unknown forms
    pub fn delete(&self, guild_id: u64, name: &str) -> Result<FormTemplate, FormError> {
        let form = self
            .find(guild_id, name)
            .ok_or_else(|| FormError::NotFound(name.to_string()))?;
        self.templates.remove(&form.id);
        info!(form_id = %form.id, guild_id = %guild_id, "Form deleted");
        Ok(form)
    }

    /// Record a member's answers
    ///
    /// # Errors
    /// Returns an error if the answer count differs from the question count
    /// or a required answer is blank
    pub fn submit(
        &self,
        form_id: &str,
        user_id: u64,
        answers: Vec<String>,
    ) -> Result<Submission, FormError> {
        let form = self
            .get(form_id)
            .ok_or_else(|| FormError::NotFound(form_id.to_string()))?;
        if form.questions.is_empty() {
            return Err(FormError::NoQuestions(form.name));
        }
        if answers.len() != form.questions.len() {
            return Err(FormError::AnswerCount {
                expected: form.questions.len(),
                got: answers.len(),
            });
        }
        if let Some(index) = form
            .questions
            .iter()
            .zip(&answers)
            .position(|(question, answer)| question.required && answer.trim().is_empty())
        {
            return Err(FormError::MissingAnswer(index + 1));
        }

        let submission = Submission {
            id: Uuid::new_v4().to_string(),
            form_id: form.id,
            guild_id: form.guild_id,
            user_id,
            answers,
            state: SubmissionState::Pending,
            submitted_at: Utc::now(),
            reviewer_id: None,
            reviewed_at: None,
        };
        self.submissions
            .insert(submission.id.clone(), submission.clone());

        info!(
            submission_id = %submission.id,
            form_id = %submission.form_id,
            user_id = %user_id,
            "Form submitted"
        );
        Ok(submission)
    }

    #[must_use]
    pub fn submission(&self, id: &str) -> Option<Submission> {
        self.submissions.get(id).map(|entry| entry.value().clone())
    }

    /// Accept or reject a pending submission
    ///
    /// # Errors
    /// Returns an error for unknown or already reviewed submissions
    pub fn review(
        &self,
        submission_id: &str,
        reviewer_id: u64,
        accept: bool,
    ) -> Result<Submission, FormError> {
        let mut submission = self
            .submissions
            .get_mut(submission_id)
            .ok_or_else(|| FormError::SubmissionNotFound(submission_id.to_string()))?;
        submission.review(reviewer_id, accept)?;
        Ok(submission.clone())
    }

    #[must_use]
    pub fn all_templates(&self) -> Vec<FormTemplate> {
        self.templates.iter().map(|e| e.value().clone()).collect()
    }

    #[must_use]
    pub fn all_submissions(&self) -> Vec<Submission> {
        self.submissions.iter().map(|e| e.value().clone()).collect()
    }

    pub fn insert_template(&self, form: FormTemplate) {
        self.templates.insert(form.id.clone(), form);
    }

    pub fn insert_submission(&self, submission: Submission) {
        self.submissions.insert(submission.id.clone(), submission);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_form() -> (FormStore, FormTemplate) {
        let store = FormStore::new();
        store.create(1, "Staff", "Staff application", Some(50), 9).unwrap();
        store
            .add_question(1, "staff", "Why do you want to help?", QuestionStyle::Paragraph, true)
            .unwrap();
        let form = store
            .add_question(1, "staff", "Timezone", QuestionStyle::Short, false)
            .unwrap();
        (store, form)
    }

    #[test]
    fn test_create_unique_per_guild() {
        let (store, form) = store_with_form();
        assert_eq!(form.questions.len(), 2);
        assert!(matches!(
            store.create(1, " STAFF ", "", None, 9),
            Err(FormError::NameTaken(_))
        ));
        assert!(store.create(2, "Staff", "", None, 9).is_ok());
        assert!(matches!(
            store.create(1, "  ", "", None, 9),
            Err(FormError::InvalidName(_))
        ));
        assert_eq!(store.list(1).len(), 1);
        assert_eq!(store.list(2)[0].title, "Staff");
    }

    #[test]
    fn test_concurrent_creates_keep_names_unique() {
        let store = FormStore::new();
        let barrier = std::sync::Barrier::new(6);

        std::thread::scope(|scope| {
            for user in 0..6 {
                let (store, barrier) = (&store, &barrier);
                scope.spawn(move || {
                    barrier.wait();
                    let _ = store.create(1, "Staff", "", None, user);
                });
            }
        });

        assert_eq!(store.list(1).len(), 1);
    }

    #[test]
    fn test_question_limits() {
        let (store, _) = store_with_form();
        assert!(matches!(
            store.add_question(1, "staff", &"x".repeat(46), QuestionStyle::Short, true),
            Err(FormError::LabelTooLong)
        ));
        for n in 0..3 {
            store
                .add_question(1, "staff", &format!("Extra {n}"), QuestionStyle::Short, true)
                .unwrap();
        }
        assert!(matches!(
            store.add_question(1, "staff", "One too many", QuestionStyle::Short, true),
            Err(FormError::TooManyQuestions)
        ));

        let form = store.remove_question(1, "staff", 1).unwrap();
        assert_eq!(form.questions.len(), 4);
        assert_eq!(form.questions[0].label, "Timezone");
        assert!(matches!(
            store.remove_question(1, "staff", 0),
            Err(FormError::QuestionNotFound(0))
        ));
        assert!(matches!(
            store.remove_question(1, "missing", 1),
            Err(FormError::NotFound(_))
        ));
    }

    #[test]
    fn test_submit_validation() {
        let (store, form) = store_with_form();
        assert!(matches!(
            store.submit(&form.id, 4, vec!["only one".to_string()]),
            Err(FormError::AnswerCount { expected: 2, got: 1 })
        ));
        assert!(matches!(
            store.submit(&form.id, 4, vec!["   ".to_string(), "UTC".to_string()]),
            Err(FormError::MissingAnswer(1))
        ));

        // Optional answers may be blank
        let submission = store
            .submit(&form.id, 4, vec!["I like people".to_string(), String::new()])
            .unwrap();
        assert_eq!(submission.state, SubmissionState::Pending);
        assert_eq!(submission.guild_id, 1);
    }

    #[test]
    fn test_empty_form_rejects_submissions() {
        let store = FormStore::new();
        let form = store.create(1, "Empty", "", None, 9).unwrap();
        assert!(matches!(
            store.submit(&form.id, 4, Vec::new()),
            Err(FormError::NoQuestions(_))
        ));
    }

    #[test]
    fn test_review_once() {
        let (store, form) = store_with_form();
        let submission = store
            .submit(&form.id, 4, vec!["Yes".to_string(), "CET".to_string()])
            .unwrap();

        let reviewed = store.review(&submission.id, 9, true).unwrap();
        assert_eq!(reviewed.state, SubmissionState::Accepted);
        assert_eq!(reviewed.reviewer_id, Some(9));
        assert!(matches!(
            store.review(&submission.id, 9, false),
            Err(FormError::AlreadyReviewed(SubmissionState::Accepted))
        ));
        assert!(matches!(
            store.review("nope", 9, true),
            Err(FormError::SubmissionNotFound(_))
        ));
    }

    #[test]
    fn test_delete_keeps_submissions() {
        let (store, form) = store_with_form();
        let submission = store
            .submit(&form.id, 4, vec!["Yes".to_string(), String::new()])
            .unwrap();
        store.delete(1, "Staff").unwrap();
        assert!(store.find(1, "staff").is_none());
        assert!(store.submission(&submission.id).is_some());
    }
}
