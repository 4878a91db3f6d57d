//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of the persistence ports. Used when no
//! `DATABASE_URL` is configured (local development) and by the test suite.
//! Data lives only as long as the process.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use study_assistant_core::domain::{
    BlobRef, Owner, PasswordReset, SessionDetails, SessionUpload, StudySession, User,
    UserCredentials,
};
use study_assistant_core::ports::{
    AttachedUpload, BlobStore, PortError, PortResult, SessionStore, UserStore,
};
use tokio::sync::RwLock;
use uuid::Uuid;

/// A blob as held in memory, with the metadata it was stored with.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Default)]
pub struct InMemoryStore {
    sessions: RwLock<HashMap<Uuid, StudySession>>,
    blobs: RwLock<HashMap<BlobRef, StoredBlob>>,
    users: RwLock<HashMap<Uuid, UserCredentials>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently held.
    pub async fn blob_count(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn blob(&self, blob_ref: &BlobRef) -> Option<StoredBlob> {
        self.blobs.read().await.get(blob_ref).cloned()
    }
}

fn session_not_found(session_id: Uuid) -> PortError {
    PortError::NotFound(format!("Study session {} not found", session_id))
}

//=========================================================================================
// `SessionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn list_sessions(&self, owner: &Owner) -> PortResult<Vec<StudySession>> {
        let sessions = self.sessions.read().await;
        let mut owned: Vec<StudySession> = sessions
            .values()
            .filter(|s| &s.owner == owner)
            .cloned()
            .collect();
        owned.sort_by_key(|s| s.created_at);
        Ok(owned)
    }

    async fn create_session(
        &self,
        owner: &Owner,
        details: &SessionDetails,
    ) -> PortResult<StudySession> {
        let now = Utc::now();
        let session = StudySession {
            id: Uuid::new_v4(),
            owner: owner.clone(),
            name: details.name().to_string(),
            subject: details.subject().to_string(),
            upload: None,
            created_at: now,
            updated_at: now,
        };
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, owner: &Owner, session_id: Uuid) -> PortResult<StudySession> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .filter(|s| &s.owner == owner)
            .cloned()
            .ok_or_else(|| session_not_found(session_id))
    }

    async fn rename_session(
        &self,
        owner: &Owner,
        session_id: Uuid,
        details: &SessionDetails,
    ) -> PortResult<StudySession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&session_id)
            .filter(|s| &s.owner == owner)
            .ok_or_else(|| session_not_found(session_id))?;
        session.name = details.name().to_string();
        session.subject = details.subject().to_string();
        session.updated_at = Utc::now();
        Ok(session.clone())
    }

    async fn delete_session(&self, owner: &Owner, session_id: Uuid) -> PortResult<StudySession> {
        let mut sessions = self.sessions.write().await;
        let owned = sessions
            .get(&session_id)
            .is_some_and(|s| &s.owner == owner);
        if !owned {
            return Err(session_not_found(session_id));
        }
        sessions
            .remove(&session_id)
            .ok_or_else(|| session_not_found(session_id))
    }

    async fn attach_upload(
        &self,
        owner: &Owner,
        session_id: Uuid,
        upload: SessionUpload,
    ) -> PortResult<AttachedUpload> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&session_id)
            .filter(|s| &s.owner == owner)
            .ok_or_else(|| session_not_found(session_id))?;
        let replaced = session.upload.replace(upload).map(|previous| previous.file_ref);
        session.updated_at = Utc::now();
        Ok(AttachedUpload {
            session: session.clone(),
            replaced,
        })
    }
}

//=========================================================================================
// `BlobStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl BlobStore for InMemoryStore {
    async fn put_blob(
        &self,
        blob_ref: &BlobRef,
        file_name: &str,
        content_type: &str,
        data: Bytes,
    ) -> PortResult<()> {
        let mut blobs = self.blobs.write().await;
        if blobs.contains_key(blob_ref) {
            return Err(PortError::Conflict(format!("Blob {} already exists", blob_ref)));
        }
        blobs.insert(
            blob_ref.clone(),
            StoredBlob {
                file_name: file_name.to_string(),
                content_type: content_type.to_string(),
                data,
            },
        );
        Ok(())
    }

    async fn delete_blob(&self, blob_ref: &BlobRef) -> PortResult<()> {
        self.blobs
            .write()
            .await
            .remove(blob_ref)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound(format!("Blob {} not found", blob_ref)))
    }

    async fn blob_exists(&self, blob_ref: &BlobRef) -> PortResult<bool> {
        Ok(self.blobs.read().await.contains_key(blob_ref))
    }
}

//=========================================================================================
// `UserStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl UserStore for InMemoryStore {
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> PortResult<User> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|c| c.user.username == username || c.user.email == email)
        {
            return Err(PortError::Conflict(
                "Username or email already exists".to_string(),
            ));
        }
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
        };
        users.insert(
            user.id,
            UserCredentials {
                user: user.clone(),
                password_hash: password_hash.to_string(),
                reset: None,
            },
        );
        Ok(user)
    }

    async fn find_by_identifier(&self, identifier: &str) -> PortResult<UserCredentials> {
        self.users
            .read()
            .await
            .values()
            .find(|c| c.user.username == identifier || c.user.email == identifier)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", identifier)))
    }

    async fn find_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.users
            .read()
            .await
            .values()
            .find(|c| c.user.email == email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }

    async fn set_password_reset(&self, user_id: Uuid, reset: &PasswordReset) -> PortResult<()> {
        let mut users = self.users.write().await;
        let credentials = users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        credentials.reset = Some(reset.clone());
        Ok(())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> PortResult<()> {
        let mut users = self.users.write().await;
        let credentials = users
            .get_mut(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
        credentials.password_hash = password_hash.to_string();
        credentials.reset = None;
        Ok(())
    }
}
