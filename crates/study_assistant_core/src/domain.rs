//! crates/study_assistant_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

//=========================================================================================
// Ownership
//=========================================================================================

/// The opaque token that identifies an anonymous guest.
///
/// No account record exists for a guest; ownership is purely "every session whose
/// guest id equals this token".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GuestId(String);

impl GuestId {
    const MAX_LEN: usize = 128;

    /// Mints a fresh, collision-resistant guest token (a v4 UUID, 122 random bits, hex encoded).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Accepts a client-supplied token. Blank, oversized or non-token-like input is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let token = raw.trim();
        let well_formed = !token.is_empty()
            && token.len() <= Self::MAX_LEN
            && token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        well_formed.then(|| Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GuestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who a study session belongs to. Exactly one of a registered user or a guest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Owner {
    User(Uuid),
    Guest(GuestId),
}

impl Owner {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Owner::User(id) => Some(*id),
            Owner::Guest(_) => None,
        }
    }

    pub fn guest_id(&self) -> Option<&GuestId> {
        match self {
            Owner::User(_) => None,
            Owner::Guest(id) => Some(id),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::User(id) => write!(f, "user:{id}"),
            Owner::Guest(id) => write!(f, "guest:{id}"),
        }
    }
}

//=========================================================================================
// Blobs and Document Formats
//=========================================================================================

/// Opaque reference to an uploaded file's bytes in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobRef(String);

impl BlobRef {
    /// Wraps a reference previously handed out by the blob store.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a fresh storage name. The user-supplied file name is never used,
    /// only its (sanitised) extension is kept as a suffix.
    pub fn generate(original_file_name: &str) -> Self {
        let stem = Uuid::new_v4().simple().to_string();
        match file_extension(original_file_name) {
            Some(ext) => Self(format!("{stem}.{ext}")),
            None => Self(stem),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lower-cased extension of a file name, without the dot.
///
/// Extensions that are not short and alphanumeric are treated as absent.
pub fn file_extension(file_name: &str) -> Option<String> {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 10 {
        return None;
    }
    ext.chars()
        .all(|c| c.is_ascii_alphanumeric())
        .then(|| ext.to_ascii_lowercase())
}

/// How an uploaded document is turned into text. Chosen by declared extension only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    /// Legacy binary Word format; always rejected.
    LegacyDoc,
    PlainText,
}

impl DocumentFormat {
    pub fn from_file_name(file_name: &str) -> Self {
        match file_extension(file_name).as_deref() {
            Some("pdf") => DocumentFormat::Pdf,
            Some("docx") => DocumentFormat::Docx,
            Some("doc") => DocumentFormat::LegacyDoc,
            _ => DocumentFormat::PlainText,
        }
    }
}

//=========================================================================================
// Questions
//=========================================================================================

/// The letter designating the correct option of a [`Question`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerKey {
    A,
    B,
    C,
    D,
}

impl AnswerKey {
    pub const ALL: [AnswerKey; 4] = [AnswerKey::A, AnswerKey::B, AnswerKey::C, AnswerKey::D];

    pub fn index(self) -> usize {
        match self {
            AnswerKey::A => 0,
            AnswerKey::B => 1,
            AnswerKey::C => 2,
            AnswerKey::D => 3,
        }
    }

    pub fn letter(self) -> char {
        match self {
            AnswerKey::A => 'A',
            AnswerKey::B => 'B',
            AnswerKey::C => 'C',
            AnswerKey::D => 'D',
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Case-insensitive letter lookup.
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'A' => Some(AnswerKey::A),
            'B' => Some(AnswerKey::B),
            'C' => Some(AnswerKey::C),
            'D' => Some(AnswerKey::D),
            _ => None,
        }
    }
}

impl fmt::Display for AnswerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Why a candidate question was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuestionError {
    #[error("question text is empty")]
    EmptyText,
    #[error("option {0} is empty")]
    EmptyOption(char),
    #[error("options {0} and {1} are identical")]
    DuplicateOption(char, char),
}

/// One multiple-choice item: a question, exactly four distinct options and the
/// letter of the correct one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    text: String,
    options: [String; 4],
    answer: AnswerKey,
}

impl Question {
    pub fn new(
        text: impl Into<String>,
        options: [String; 4],
        answer: AnswerKey,
    ) -> Result<Self, QuestionError> {
        let text = text.into().trim().to_string();
        if text.is_empty() {
            return Err(QuestionError::EmptyText);
        }

        let options = options.map(|o| o.trim().to_string());
        for (i, option) in options.iter().enumerate() {
            let key = AnswerKey::ALL[i].letter();
            if option.is_empty() {
                return Err(QuestionError::EmptyOption(key));
            }
            if let Some(j) = options[..i]
                .iter()
                .position(|earlier| earlier.eq_ignore_ascii_case(option))
            {
                return Err(QuestionError::DuplicateOption(AnswerKey::ALL[j].letter(), key));
            }
        }

        Ok(Self {
            text,
            options,
            answer,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn options(&self) -> &[String; 4] {
        &self.options
    }

    pub fn answer(&self) -> AnswerKey {
        self.answer
    }

    /// The text of the correct option.
    pub fn correct_option(&self) -> &str {
        &self.options[self.answer.index()]
    }
}

//=========================================================================================
// Study Sessions
//=========================================================================================

/// The user-editable metadata of a study session. Both fields are non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDetails {
    name: String,
    subject: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Name and subject are required")]
pub struct InvalidSessionDetails;

impl SessionDetails {
    pub fn new(name: &str, subject: &str) -> Result<Self, InvalidSessionDetails> {
        let (name, subject) = (name.trim(), subject.trim());
        if name.is_empty() || subject.is_empty() {
            return Err(InvalidSessionDetails);
        }
        Ok(Self {
            name: name.to_string(),
            subject: subject.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Everything derived from the most recent upload. Grouped so that a session
/// without a file cannot carry a summary or questions.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUpload {
    pub file_ref: BlobRef,
    pub file_name: String,
    pub extracted_text: String,
    pub summary: String,
    pub questions: Vec<Question>,
}

/// One study session: an owner, its metadata, and at most one processed upload.
#[derive(Debug, Clone, PartialEq)]
pub struct StudySession {
    pub id: Uuid,
    pub owner: Owner,
    pub name: String,
    pub subject: String,
    pub upload: Option<SessionUpload>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudySession {
    pub fn summary(&self) -> Option<&str> {
        self.upload.as_ref().map(|u| u.summary.as_str())
    }

    pub fn questions(&self) -> &[Question] {
        self.upload
            .as_ref()
            .map(|u| u.questions.as_slice())
            .unwrap_or_default()
    }
}

//=========================================================================================
// Users
//=========================================================================================

/// Represents a registered user - used throughout the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

/// A pending password reset: a one-time code and when it stops being valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordReset {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl PasswordReset {
    /// How long a reset code stays valid.
    pub fn ttl() -> chrono::Duration {
        chrono::Duration::hours(1)
    }

    pub fn accepts(&self, code: &str, now: DateTime<Utc>) -> bool {
        self.code == code.trim() && now < self.expires_at
    }
}

// Only used internally for login and password resets - contains sensitive data.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
    pub reset: Option<PasswordReset>,
}
