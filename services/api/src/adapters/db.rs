//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pet_tales_core::domain::{Chapter, Owner, PetProfile, PetSex, User, UserCredentials};
use pet_tales_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
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

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn not_found_or_unexpected(e: sqlx::Error, what: String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        other => unexpected(other),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: String,
    display_name: Option<String>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            user_id: self.user_id,
            email: Some(self.email),
            display_name: self.display_name,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
    email_confirmed: bool,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
            email_confirmed: self.email_confirmed,
        }
    }
}

#[derive(FromRow)]
struct ChapterRecord {
    id: Uuid,
    user_id: Uuid,
    name: String,
    content: String,
    word_count: i32,
    sort_order: i32,
    created_at: DateTime<Utc>,
}
impl ChapterRecord {
    fn to_domain(self) -> Chapter {
        Chapter {
            id: self.id,
            name: self.name,
            content: self.content,
            word_count: self.word_count.max(0) as usize,
            sort_order: self.sort_order,
            owner: Owner::User(self.user_id),
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct MilestonesRecord {
    pet_type: String,
    pet_type_other: String,
    name: String,
    breed: String,
    sex: String,
    dob: String,
    gotcha_date: String,
    appearance: String,
    personality: String,
    favorite_things: String,
    relationship_to_owner: String,
    significant_memories: String,
    hopes_and_aspirations: String,
}
impl MilestonesRecord {
    fn to_domain(self) -> PetProfile {
        PetProfile {
            pet_type: self.pet_type,
            pet_type_other: self.pet_type_other,
            name: self.name,
            breed: self.breed,
            sex: PetSex::parse(&self.sex),
            dob: self.dob,
            gotcha_date: self.gotcha_date,
            appearance: self.appearance,
            personality: self.personality,
            favorite_things: self.favorite_things,
            relationship_to_owner: self.relationship_to_owner,
            significant_memories: self.significant_memories,
            hopes_and_aspirations: self.hopes_and_aspirations,
        }
    }
}

const CHAPTER_COLUMNS: &str = "id, user_id, name, content, word_count, sort_order, created_at";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
        display_name: Option<&str>,
        email_confirmed: bool,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (email, hashed_password, display_name, email_confirmed) \
             VALUES ($1, $2, $3, $4) RETURNING user_id, email, display_name",
        )
        .bind(email)
        .bind(hashed_password)
        .bind(display_name)
        .bind(email_confirmed)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                PortError::Conflict(format!("User {} already exists", email))
            }
            other => unexpected(other),
        })?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, email, hashed_password, email_confirmed FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, format!("User {} not found", email)))?;
        Ok(record.to_domain())
    }

    async fn get_user(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, email, display_name FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        user_id.ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn create_chapter(&self, chapter: &Chapter) -> PortResult<Chapter> {
        let Owner::User(user_id) = chapter.owner else {
            return Err(PortError::Unauthorized);
        };
        let record = sqlx::query_as::<_, ChapterRecord>(&format!(
            "INSERT INTO chapters (id, user_id, name, content, word_count, sort_order) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            CHAPTER_COLUMNS
        ))
        .bind(chapter.id)
        .bind(user_id)
        .bind(&chapter.name)
        .bind(&chapter.content)
        .bind(chapter.word_count as i32)
        .bind(chapter.sort_order)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn list_chapters(&self, user_id: Uuid) -> PortResult<Vec<Chapter>> {
        let records = sqlx::query_as::<_, ChapterRecord>(&format!(
            "SELECT {} FROM chapters WHERE user_id = $1 ORDER BY sort_order ASC, created_at ASC",
            CHAPTER_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_chapter(&self, chapter_id: Uuid) -> PortResult<Chapter> {
        let record = sqlx::query_as::<_, ChapterRecord>(&format!(
            "SELECT {} FROM chapters WHERE id = $1",
            CHAPTER_COLUMNS
        ))
        .bind(chapter_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or_unexpected(e, format!("Chapter {} not found", chapter_id)))?;
        Ok(record.to_domain())
    }

    async fn update_chapter_content(
        &self,
        chapter_id: Uuid,
        content: &str,
        word_count: usize,
    ) -> PortResult<()> {
        let result = sqlx::query("UPDATE chapters SET content = $1, word_count = $2 WHERE id = $3")
            .bind(content)
            .bind(word_count as i32)
            .bind(chapter_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Chapter {} not found", chapter_id)));
        }
        Ok(())
    }

    async fn rename_chapter(&self, chapter_id: Uuid, name: &str) -> PortResult<()> {
        let result = sqlx::query("UPDATE chapters SET name = $1 WHERE id = $2")
            .bind(name)
            .bind(chapter_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Chapter {} not found", chapter_id)));
        }
        Ok(())
    }

    async fn get_profile(&self, user_id: Uuid) -> PortResult<Option<PetProfile>> {
        let record = sqlx::query_as::<_, MilestonesRecord>(
            "SELECT pet_type, pet_type_other, name, breed, sex, dob, gotcha_date, appearance, \
             personality, favorite_things, relationship_to_owner, significant_memories, \
             hopes_and_aspirations FROM milestones WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn upsert_profile(&self, user_id: Uuid, profile: &PetProfile) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO milestones (user_id, pet_type, pet_type_other, name, breed, sex, dob, \
             gotcha_date, appearance, personality, favorite_things, relationship_to_owner, \
             significant_memories, hopes_and_aspirations) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (user_id) DO UPDATE SET \
             pet_type = EXCLUDED.pet_type, pet_type_other = EXCLUDED.pet_type_other, \
             name = EXCLUDED.name, breed = EXCLUDED.breed, sex = EXCLUDED.sex, \
             dob = EXCLUDED.dob, gotcha_date = EXCLUDED.gotcha_date, \
             appearance = EXCLUDED.appearance, personality = EXCLUDED.personality, \
             favorite_things = EXCLUDED.favorite_things, \
             relationship_to_owner = EXCLUDED.relationship_to_owner, \
             significant_memories = EXCLUDED.significant_memories, \
             hopes_and_aspirations = EXCLUDED.hopes_and_aspirations, \
             updated_at = NOW()",
        )
        .bind(user_id)
        .bind(&profile.pet_type)
        .bind(&profile.pet_type_other)
        .bind(&profile.name)
        .bind(&profile.breed)
        .bind(profile.sex.as_str())
        .bind(&profile.dob)
        .bind(&profile.gotcha_date)
        .bind(&profile.appearance)
        .bind(&profile.personality)
        .bind(&profile.favorite_things)
        .bind(&profile.relationship_to_owner)
        .bind(&profile.significant_memories)
        .bind(&profile.hopes_and_aspirations)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }
}
