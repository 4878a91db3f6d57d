//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the PostgreSQL implementation of the
//! `SessionStore`, `BlobStore` and `UserStore` ports from the `core` crate. It handles
//! all interactions with the database using `sqlx`.
//!
//! Every session query matches on id AND owner. Owner matching uses
//! `IS NOT DISTINCT FROM` on both owner columns, so a user id never matches a guest
//! row and vice versa.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, PgPool};
use study_assistant_core::domain::{
    AnswerKey, BlobRef, GuestId, Owner, PasswordReset, Question, SessionDetails, SessionUpload,
    StudySession, User, UserCredentials,
};
use study_assistant_core::ports::{
    AttachedUpload, BlobStore, PortError, PortResult, SessionStore, UserStore,
};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the persistence ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

const SESSION_COLUMNS: &str = "id, user_id, guest_id, name, subject, uploaded_file_ref, \
     file_name, extracted_text, summary, questions, created_at, updated_at";

const OWNER_MATCH: &str = "user_id IS NOT DISTINCT FROM $2 AND guest_id IS NOT DISTINCT FROM $3";

fn owner_columns(owner: &Owner) -> (Option<Uuid>, Option<String>) {
    (owner.user_id(), owner.guest_id().map(|g| g.as_str().to_string()))
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn session_not_found(session_id: Uuid) -> PortError {
    PortError::NotFound(format!("Study session {} not found", session_id))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

/// The JSON shape of one question inside the `questions` column.
#[derive(Serialize, Deserialize)]
struct QuestionRecord {
    question: String,
    options: Vec<String>,
    answer: String,
}
impl QuestionRecord {
    fn from_domain(question: &Question) -> Self {
        Self {
            question: question.text().to_string(),
            options: question.options().to_vec(),
            answer: question.answer().to_string(),
        }
    }

    fn to_domain(self) -> PortResult<Question> {
        let corrupt = |why: String| PortError::Unexpected(format!("stored question is invalid: {why}"));
        let options: [String; 4] = self
            .options
            .try_into()
            .map_err(|o: Vec<String>| corrupt(format!("{} options", o.len())))?;
        let answer = self
            .answer
            .chars()
            .next()
            .and_then(AnswerKey::from_letter)
            .ok_or_else(|| corrupt(format!("answer '{}'", self.answer)))?;
        Question::new(self.question, options, answer).map_err(|e| corrupt(e.to_string()))
    }
}

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    user_id: Option<Uuid>,
    guest_id: Option<String>,
    name: String,
    subject: String,
    uploaded_file_ref: Option<String>,
    file_name: Option<String>,
    extracted_text: Option<String>,
    summary: Option<String>,
    questions: Json<Vec<QuestionRecord>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl SessionRecord {
    fn to_domain(self) -> PortResult<StudySession> {
        let owner = match (self.user_id, self.guest_id) {
            (Some(user_id), None) => Owner::User(user_id),
            (None, Some(guest_id)) => Owner::Guest(GuestId::parse(&guest_id).ok_or_else(|| {
                PortError::Unexpected(format!("session {} has an invalid guest id", self.id))
            })?),
            _ => {
                return Err(PortError::Unexpected(format!(
                    "session {} does not have exactly one owner",
                    self.id
                )))
            }
        };

        let upload = match (self.uploaded_file_ref, self.summary) {
            (Some(file_ref), Some(summary)) => Some(SessionUpload {
                file_ref: BlobRef::new(file_ref),
                file_name: self.file_name.unwrap_or_default(),
                extracted_text: self.extracted_text.unwrap_or_default(),
                summary,
                questions: self
                    .questions
                    .0
                    .into_iter()
                    .map(QuestionRecord::to_domain)
                    .collect::<PortResult<_>>()?,
            }),
            _ => None,
        };

        Ok(StudySession {
            id: self.id,
            owner,
            name: self.name,
            subject: self.subject,
            upload,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct AttachRecord {
    #[sqlx(flatten)]
    session: SessionRecord,
    previous_file_ref: Option<String>,
}

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    password_reset_code: Option<String>,
    password_reset_expires_at: Option<DateTime<Utc>>,
}
impl UserRecord {
    fn to_domain(self) -> UserCredentials {
        let reset = match (self.password_reset_code, self.password_reset_expires_at) {
            (Some(code), Some(expires_at)) => Some(PasswordReset { code, expires_at }),
            _ => None,
        };
        UserCredentials {
            user: User {
                id: self.id,
                username: self.username,
                email: self.email,
            },
            password_hash: self.password_hash,
            reset,
        }
    }
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, password_reset_code, password_reset_expires_at";

//=========================================================================================
// `SessionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl SessionStore for DbAdapter {
    async fn list_sessions(&self, owner: &Owner) -> PortResult<Vec<StudySession>> {
        let (user_id, guest_id) = owner_columns(owner);
        let records = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM study_sessions \
             WHERE user_id IS NOT DISTINCT FROM $1 AND guest_id IS NOT DISTINCT FROM $2 \
             ORDER BY created_at ASC"
        ))
        .bind(user_id)
        .bind(guest_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(SessionRecord::to_domain).collect()
    }

    async fn create_session(
        &self,
        owner: &Owner,
        details: &SessionDetails,
    ) -> PortResult<StudySession> {
        let (user_id, guest_id) = owner_columns(owner);
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "INSERT INTO study_sessions (id, user_id, guest_id, name, subject) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {SESSION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(guest_id)
        .bind(details.name())
        .bind(details.subject())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        record.to_domain()
    }

    async fn get_session(&self, owner: &Owner, session_id: Uuid) -> PortResult<StudySession> {
        let (user_id, guest_id) = owner_columns(owner);
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM study_sessions WHERE id = $1 AND {OWNER_MATCH}"
        ))
        .bind(session_id)
        .bind(user_id)
        .bind(guest_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| session_not_found(session_id))?;

        record.to_domain()
    }

    async fn rename_session(
        &self,
        owner: &Owner,
        session_id: Uuid,
        details: &SessionDetails,
    ) -> PortResult<StudySession> {
        let (user_id, guest_id) = owner_columns(owner);
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "UPDATE study_sessions SET name = $4, subject = $5, updated_at = NOW() \
             WHERE id = $1 AND {OWNER_MATCH} RETURNING {SESSION_COLUMNS}"
        ))
        .bind(session_id)
        .bind(user_id)
        .bind(guest_id)
        .bind(details.name())
        .bind(details.subject())
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| session_not_found(session_id))?;

        record.to_domain()
    }

    async fn delete_session(&self, owner: &Owner, session_id: Uuid) -> PortResult<StudySession> {
        let (user_id, guest_id) = owner_columns(owner);
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "DELETE FROM study_sessions WHERE id = $1 AND {OWNER_MATCH} RETURNING {SESSION_COLUMNS}"
        ))
        .bind(session_id)
        .bind(user_id)
        .bind(guest_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| session_not_found(session_id))?;

        record.to_domain()
    }

    async fn attach_upload(
        &self,
        owner: &Owner,
        session_id: Uuid,
        upload: SessionUpload,
    ) -> PortResult<AttachedUpload> {
        let (user_id, guest_id) = owner_columns(owner);
        let questions: Vec<QuestionRecord> =
            upload.questions.iter().map(QuestionRecord::from_domain).collect();

        // One statement: the row lock taken by the CTE lets us report the blob being
        // replaced without a separate read-modify-write.
        let record = sqlx::query_as::<_, AttachRecord>(&format!(
            "WITH previous AS ( \
                 SELECT id, uploaded_file_ref FROM study_sessions \
                 WHERE id = $1 AND {OWNER_MATCH} FOR UPDATE \
             ) \
             UPDATE study_sessions s \
             SET uploaded_file_ref = $4, file_name = $5, extracted_text = $6, summary = $7, \
                 questions = $8, updated_at = NOW() \
             FROM previous WHERE s.id = previous.id \
             RETURNING s.id, s.user_id, s.guest_id, s.name, s.subject, s.uploaded_file_ref, \
                 s.file_name, s.extracted_text, s.summary, s.questions, s.created_at, \
                 s.updated_at, previous.uploaded_file_ref AS previous_file_ref"
        ))
        .bind(session_id)
        .bind(user_id)
        .bind(guest_id)
        .bind(upload.file_ref.as_str())
        .bind(&upload.file_name)
        .bind(&upload.extracted_text)
        .bind(&upload.summary)
        .bind(Json(&questions))
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| session_not_found(session_id))?;

        Ok(AttachedUpload {
            session: record.session.to_domain()?,
            replaced: record.previous_file_ref.map(BlobRef::new),
        })
    }
}

//=========================================================================================
// `BlobStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl BlobStore for DbAdapter {
    async fn put_blob(
        &self,
        blob_ref: &BlobRef,
        file_name: &str,
        content_type: &str,
        data: Bytes,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO uploads (id, file_name, content_type, data) VALUES ($1, $2, $3, $4)",
        )
        .bind(blob_ref.as_str())
        .bind(file_name)
        .bind(content_type)
        .bind(data.as_ref())
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn delete_blob(&self, blob_ref: &BlobRef) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM uploads WHERE id = $1")
            .bind(blob_ref.as_str())
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Blob {} not found", blob_ref)));
        }
        Ok(())
    }

    async fn blob_exists(&self, blob_ref: &BlobRef) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM uploads WHERE id = $1)")
            .bind(blob_ref.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)
    }
}

//=========================================================================================
// `UserStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl UserStore for DbAdapter {
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (id, username, email, password_hash) VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let duplicate = e
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation());
            if duplicate {
                PortError::Conflict("Username or email already exists".to_string())
            } else {
                unexpected(e)
            }
        })?;

        Ok(record.to_domain().user)
    }

    async fn find_by_identifier(&self, identifier: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $1 LIMIT 1"
        ))
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", identifier)))?;

        Ok(record.to_domain())
    }

    async fn find_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))?;

        Ok(record.to_domain())
    }

    async fn set_password_reset(&self, user_id: Uuid, reset: &PasswordReset) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE users SET password_reset_code = $2, password_reset_expires_at = $3 WHERE id = $1",
        )
        .bind(user_id)
        .bind(&reset.code)
        .bind(reset.expires_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, password_reset_code = NULL, \
             password_reset_expires_at = NULL WHERE id = $1",
        )
        .bind(user_id)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }
}
