//! Postgres `SubjectStore` + `SubjectAdmin`.
//!
//! `commit_observation` reads the previous log, upserts it and updates
//! `last_checked` in one transaction. Readers outside the transaction see both
//! writes or neither. The subject row lock taken by the update serializes
//! commits for one subject across processes, so each commit reads the log the
//! last one wrote.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kdw_reconcile::{Committed, StoreError, SubjectAdmin, SubjectStore};
use kdw_schemas::{
    GameIdentity, NewSubject, NewUser, Observation, PerformanceLog, Subject, SubjectId, User,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;

const SUBJECT_SELECT: &str = r#"
    select s.id, s.owner_id, s.puuid, s.game_name, s.tagline, s.region,
           s.active, s.last_checked, u.phone_number
    from subjects s
    left join users u on u.id = s.owner_id
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// SQLSTATE-aware mapping into the store taxonomy.
fn map_err(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::RowNotFound => StoreError::NotFound(e.to_string()),
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StoreError::Unavailable(e.to_string()),
        sqlx::Error::Database(db) => match db.code().as_deref() {
            // unique_violation
            Some("23505") => StoreError::Conflict(db.message().to_string()),
            // foreign_key_violation
            Some("23503") => StoreError::NotFound(db.message().to_string()),
            _ => StoreError::Query(e.to_string()),
        },
        _ => StoreError::Query(e.to_string()),
    }
}

fn subject_from_row(row: &PgRow) -> Result<Subject, sqlx::Error> {
    Ok(Subject {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        puuid: row.try_get("puuid")?,
        identity: GameIdentity {
            game_name: row.try_get("game_name")?,
            tagline: row.try_get("tagline")?,
            region: row.try_get("region")?,
        },
        active: row.try_get("active")?,
        last_checked: row.try_get("last_checked")?,
        notify_to: row.try_get("phone_number")?,
    })
}

fn log_from_row(row: &PgRow) -> Result<PerformanceLog, sqlx::Error> {
    Ok(PerformanceLog {
        subject_id: row.try_get("subject_id")?,
        match_id: row.try_get("match_id")?,
        ratio: row.try_get("ratio")?,
        observed_at: row.try_get("observed_at")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        auth_id: row.try_get("auth_id")?,
        email: row.try_get("email")?,
        phone_number: row.try_get("phone_number")?,
        signup_date: row.try_get("signup_date")?,
    })
}

impl PgStore {
    async fn fetch_subject_where(
        &self,
        clause: &str,
        bind: SubjectKey<'_>,
    ) -> Result<Option<Subject>, StoreError> {
        let sql = format!("{SUBJECT_SELECT} where {clause}");
        let q = sqlx::query(&sql);
        let q = match bind {
            SubjectKey::Id(id) => q.bind(id),
            SubjectKey::Puuid(p) => q.bind(p),
        };
        let row = q.fetch_optional(&self.pool).await.map_err(map_err)?;
        row.as_ref()
            .map(subject_from_row)
            .transpose()
            .map_err(map_err)
    }
}

enum SubjectKey<'a> {
    Id(SubjectId),
    Puuid(&'a str),
}

#[async_trait]
impl SubjectStore for PgStore {
    async fn list_active(&self) -> Result<Vec<Subject>, StoreError> {
        let sql = format!("{SUBJECT_SELECT} where s.active order by s.id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
        rows.iter()
            .map(subject_from_row)
            .collect::<Result<_, _>>()
            .map_err(map_err)
    }

    async fn get_subject(&self, id: SubjectId) -> Result<Option<Subject>, StoreError> {
        self.fetch_subject_where("s.id = $1", SubjectKey::Id(id)).await
    }

    async fn get_log(&self, id: SubjectId) -> Result<Option<PerformanceLog>, StoreError> {
        let row = sqlx::query(
            r#"
            select subject_id, match_id, ratio, observed_at
            from performance_logs
            where subject_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        row.as_ref().map(log_from_row).transpose().map_err(map_err)
    }

    async fn commit_observation(
        &self,
        id: SubjectId,
        observation: &Observation,
        checked_at: DateTime<Utc>,
    ) -> Result<Committed, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        // Row lock on the subject, held until commit or rollback.
        let touched = sqlx::query("update subjects set last_checked = $2 where id = $1")
            .bind(id)
            .bind(checked_at)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?
            .rows_affected();
        if touched == 0 {
            // Dropping `tx` rolls back.
            return Err(StoreError::NotFound(format!("subject {id}")));
        }

        let previous = sqlx::query(
            r#"
            select subject_id, match_id, ratio, observed_at
            from performance_logs
            where subject_id = $1
            for update
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_err)?;
        let previous = previous
            .as_ref()
            .map(log_from_row)
            .transpose()
            .map_err(map_err)?;

        let row = sqlx::query(
            r#"
            insert into performance_logs (subject_id, match_id, ratio, observed_at)
            values ($1, $2, $3, $4)
            on conflict (subject_id) do update
              set match_id = excluded.match_id,
                  ratio = excluded.ratio,
                  observed_at = excluded.observed_at
            returning subject_id, match_id, ratio, observed_at
            "#,
        )
        .bind(id)
        .bind(&observation.match_id)
        .bind(observation.ratio)
        .bind(observation.observed_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_err)?;
        let current = log_from_row(&row).map_err(map_err)?;

        tx.commit().await.map_err(map_err)?;
        debug!(
            subject_id = id,
            match_id = %current.match_id,
            replaced = previous.is_some(),
            "performance log committed"
        );
        Ok(Committed { previous, current })
    }
}

#[async_trait]
impl SubjectAdmin for PgStore {
    async fn create_user(&self, new: &NewUser) -> Result<User, StoreError> {
        let row = sqlx::query(
            r#"
            insert into users (auth_id, email, phone_number)
            values ($1, $2, $3)
            returning id, auth_id, email, phone_number, signup_date
            "#,
        )
        .bind(&new.auth_id)
        .bind(&new.email)
        .bind(&new.phone_number)
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)?;
        user_from_row(&row).map_err(map_err)
    }

    async fn find_user_by_auth_id(&self, auth_id: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "select id, auth_id, email, phone_number, signup_date from users where auth_id = $1",
        )
        .bind(auth_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        row.as_ref().map(user_from_row).transpose().map_err(map_err)
    }

    async fn find_subject_by_puuid(&self, puuid: &str) -> Result<Option<Subject>, StoreError> {
        self.fetch_subject_where("s.puuid = $1", SubjectKey::Puuid(puuid))
            .await
    }

    async fn insert_subject(&self, new: &NewSubject) -> Result<Subject, StoreError> {
        let (id,): (SubjectId,) = sqlx::query_as(
            r#"
            insert into subjects (owner_id, puuid, game_name, tagline, region, active)
            values ($1, $2, $3, $4, $5, true)
            returning id
            "#,
        )
        .bind(new.owner_id)
        .bind(&new.puuid)
        .bind(&new.identity.game_name)
        .bind(&new.identity.tagline)
        .bind(&new.identity.region)
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)?;

        self.get_subject(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("subject {id}")))
    }

    async fn toggle_active(&self, id: SubjectId) -> Result<Subject, StoreError> {
        let touched = sqlx::query("update subjects set active = not active where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?
            .rows_affected();
        if touched == 0 {
            return Err(StoreError::NotFound(format!("subject {id}")));
        }
        self.get_subject(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("subject {id}")))
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>, StoreError> {
        let sql = format!("{SUBJECT_SELECT} order by s.id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
        rows.iter()
            .map(subject_from_row)
            .collect::<Result<_, _>>()
            .map_err(map_err)
    }
}
