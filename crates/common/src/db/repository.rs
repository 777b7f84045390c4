//! Repository pattern for database operations
//!
//! All session store access goes through here. The store offers no
//! cross-statement transactions in these call patterns; state transitions
//! that matter for capacity are single guarded updates whose filters encode
//! the expected prior state, with `rows_affected` telling the caller
//! whether it won or a concurrent caller already made the transition.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::Result;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{Expr, NullOrdering};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, Value,
};
use uuid::Uuid;

/// Provenance metadata captured at session creation, immutable afterwards
#[derive(Debug, Clone, Default)]
pub struct SessionOrigin {
    pub email: Option<String>,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the display-read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection.
    ///
    /// Also used for every read that feeds an admission or promotion
    /// decision: counts and candidate selection must see the primary,
    /// never a lagging replica.
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Session Creation
    // ========================================================================

    /// Insert a session directly into the active state (free slot at admission)
    pub async fn create_active_session(
        &self,
        token: String,
        origin: SessionOrigin,
        ttl: chrono::Duration,
    ) -> Result<Session> {
        let now = chrono::Utc::now();

        let session = SessionActiveModel {
            id: Set(Uuid::new_v4()),
            token: Set(token),
            status: Set(SessionStatus::Active.into()),
            queue_position: Set(None),
            email: Set(origin.email),
            user_agent: Set(origin.user_agent),
            referrer: Set(origin.referrer),
            total_cost: Set(0.0),
            total_tokens_used: Set(0),
            created_at: Set(now.into()),
            activated_at: Set(Some(now.into())),
            last_activity_at: Set(Some(now.into())),
            expires_at: Set((now + ttl).into()),
            ended_at: Set(None),
        };

        session.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Insert a session into the waiting queue with an advisory position
    pub async fn create_queued_session(
        &self,
        token: String,
        queue_position: i32,
        origin: SessionOrigin,
        ttl: chrono::Duration,
    ) -> Result<Session> {
        let now = chrono::Utc::now();

        let session = SessionActiveModel {
            id: Set(Uuid::new_v4()),
            token: Set(token),
            status: Set(SessionStatus::Queued.into()),
            queue_position: Set(Some(queue_position)),
            email: Set(origin.email),
            user_agent: Set(origin.user_agent),
            referrer: Set(origin.referrer),
            total_cost: Set(0.0),
            total_tokens_used: Set(0),
            created_at: Set(now.into()),
            activated_at: Set(None),
            last_activity_at: Set(None),
            expires_at: Set((now + ttl).into()),
            ended_at: Set(None),
        };

        session.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Insert a pending session awaiting an email-link claim
    pub async fn create_pending_session(
        &self,
        token: String,
        origin: SessionOrigin,
        ttl: chrono::Duration,
    ) -> Result<Session> {
        let now = chrono::Utc::now();

        let session = SessionActiveModel {
            id: Set(Uuid::new_v4()),
            token: Set(token),
            status: Set(SessionStatus::Pending.into()),
            queue_position: Set(None),
            email: Set(origin.email),
            user_agent: Set(origin.user_agent),
            referrer: Set(origin.referrer),
            total_cost: Set(0.0),
            total_tokens_used: Set(0),
            created_at: Set(now.into()),
            activated_at: Set(None),
            last_activity_at: Set(None),
            expires_at: Set((now + ttl).into()),
            ended_at: Set(None),
        };

        session.insert(self.write_conn()).await.map_err(Into::into)
    }

    // ========================================================================
    // Session Lookup
    // ========================================================================

    /// Find a session by its client token.
    ///
    /// Reads the primary: token lookups feed status checks (claim,
    /// heartbeat, end) and a stale row would misreport promotions.
    pub async fn find_session_by_token(&self, token: &str) -> Result<Option<Session>> {
        SessionEntity::find()
            .filter(SessionColumn::Token.eq(token))
            .one(self.write_conn())
            .await
            .map_err(Into::into)
    }

    /// Occupancy snapshot (active, queued) for operator display.
    ///
    /// The one read that may hit the replica: stale numbers on a dashboard
    /// are harmless, unlike stale numbers in an admission decision.
    pub async fn display_counts(&self) -> Result<(u64, u64)> {
        let active = SessionEntity::find()
            .filter(SessionColumn::Status.eq(String::from(SessionStatus::Active)))
            .count(self.read_conn())
            .await?;

        let queued = SessionEntity::find()
            .filter(SessionColumn::Status.eq(String::from(SessionStatus::Queued)))
            .count(self.read_conn())
            .await?;

        Ok((active, queued))
    }

    // ========================================================================
    // Capacity Counts (always fresh, always primary)
    // ========================================================================

    /// Count sessions currently holding an active slot
    pub async fn count_active(&self) -> Result<u64> {
        SessionEntity::find()
            .filter(SessionColumn::Status.eq(String::from(SessionStatus::Active)))
            .count(self.write_conn())
            .await
            .map_err(Into::into)
    }

    /// Count sessions currently waiting in the queue
    pub async fn count_queued(&self) -> Result<u64> {
        SessionEntity::find()
            .filter(SessionColumn::Status.eq(String::from(SessionStatus::Queued)))
            .count(self.write_conn())
            .await
            .map_err(Into::into)
    }

    /// Count queued sessions strictly ahead of the given position
    pub async fn count_queued_ahead(&self, queue_position: i32) -> Result<u64> {
        SessionEntity::find()
            .filter(SessionColumn::Status.eq(String::from(SessionStatus::Queued)))
            .filter(SessionColumn::QueuePosition.lt(queue_position))
            .count(self.write_conn())
            .await
            .map_err(Into::into)
    }

    /// Count queued sessions created before the given instant.
    ///
    /// Fallback ordering for rows whose advisory position is transiently
    /// missing between reconciler passes.
    pub async fn count_queued_created_before(
        &self,
        created_at: DateTimeWithTimeZone,
    ) -> Result<u64> {
        SessionEntity::find()
            .filter(SessionColumn::Status.eq(String::from(SessionStatus::Queued)))
            .filter(SessionColumn::CreatedAt.lt(created_at))
            .count(self.write_conn())
            .await
            .map_err(Into::into)
    }

    /// Earliest hard expiry among currently active sessions
    pub async fn earliest_active_expiry(&self) -> Result<Option<DateTimeWithTimeZone>> {
        let session = SessionEntity::find()
            .filter(SessionColumn::Status.eq(String::from(SessionStatus::Active)))
            .order_by_asc(SessionColumn::ExpiresAt)
            .one(self.write_conn())
            .await?;

        Ok(session.map(|s| s.expires_at))
    }

    // ========================================================================
    // Queue Operations
    // ========================================================================

    /// Queued sessions in promotion order: position ascending with missing
    /// positions last, ties broken by creation time (oldest first)
    pub async fn list_queued_ordered(&self, limit: Option<u64>) -> Result<Vec<Session>> {
        let mut query = SessionEntity::find()
            .filter(SessionColumn::Status.eq(String::from(SessionStatus::Queued)))
            .order_by_with_nulls(SessionColumn::QueuePosition, Order::Asc, NullOrdering::Last)
            .order_by_asc(SessionColumn::CreatedAt);

        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        query.all(self.write_conn()).await.map_err(Into::into)
    }

    /// Guarded promotion: queued -> active, conditioned on the row still
    /// being queued at write time. Returns false if a concurrent caller
    /// already promoted (or reclaimed) the row.
    pub async fn promote_session(&self, id: Uuid) -> Result<bool> {
        let now: DateTimeWithTimeZone = chrono::Utc::now().into();

        let result = SessionEntity::update_many()
            .col_expr(
                SessionColumn::Status,
                Expr::value(String::from(SessionStatus::Active)),
            )
            .col_expr(SessionColumn::QueuePosition, Expr::value(Value::Int(None)))
            .col_expr(SessionColumn::ActivatedAt, Expr::value(now))
            .col_expr(SessionColumn::LastActivityAt, Expr::value(now))
            .filter(SessionColumn::Id.eq(id))
            .filter(SessionColumn::Status.eq(String::from(SessionStatus::Queued)))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Guarded position rewrite for a still-queued row
    pub async fn set_queue_position(&self, id: Uuid, queue_position: i32) -> Result<bool> {
        let result = SessionEntity::update_many()
            .col_expr(SessionColumn::QueuePosition, Expr::value(queue_position))
            .filter(SessionColumn::Id.eq(id))
            .filter(SessionColumn::Status.eq(String::from(SessionStatus::Queued)))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Guarded claim into a free slot: pending -> active
    pub async fn activate_pending_session(&self, id: Uuid) -> Result<bool> {
        let now: DateTimeWithTimeZone = chrono::Utc::now().into();

        let result = SessionEntity::update_many()
            .col_expr(
                SessionColumn::Status,
                Expr::value(String::from(SessionStatus::Active)),
            )
            .col_expr(SessionColumn::ActivatedAt, Expr::value(now))
            .col_expr(SessionColumn::LastActivityAt, Expr::value(now))
            .filter(SessionColumn::Id.eq(id))
            .filter(SessionColumn::Status.eq(String::from(SessionStatus::Pending)))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Guarded claim into the queue: pending -> queued with an advisory position
    pub async fn enqueue_pending_session(&self, id: Uuid, queue_position: i32) -> Result<bool> {
        let result = SessionEntity::update_many()
            .col_expr(
                SessionColumn::Status,
                Expr::value(String::from(SessionStatus::Queued)),
            )
            .col_expr(SessionColumn::QueuePosition, Expr::value(queue_position))
            .filter(SessionColumn::Id.eq(id))
            .filter(SessionColumn::Status.eq(String::from(SessionStatus::Pending)))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Expiry & Termination
    // ========================================================================

    /// Bulk hard-TTL reclaim over non-terminal sessions. Unconditional by
    /// design: recent activity does not save a session past its ceiling.
    pub async fn expire_overdue_sessions(&self, now: DateTimeWithTimeZone) -> Result<u64> {
        let result = SessionEntity::update_many()
            .col_expr(
                SessionColumn::Status,
                Expr::value(String::from(SessionStatus::Expired)),
            )
            .col_expr(SessionColumn::QueuePosition, Expr::value(Value::Int(None)))
            .col_expr(SessionColumn::EndedAt, Expr::value(now))
            .filter(SessionColumn::Status.is_in(["pending", "queued", "active"]))
            .filter(SessionColumn::ExpiresAt.lt(now))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected)
    }

    /// Bulk inactivity reclaim over active sessions quiet since `cutoff`
    pub async fn expire_inactive_sessions(
        &self,
        cutoff: DateTimeWithTimeZone,
        now: DateTimeWithTimeZone,
    ) -> Result<u64> {
        let result = SessionEntity::update_many()
            .col_expr(
                SessionColumn::Status,
                Expr::value(String::from(SessionStatus::Expired)),
            )
            .col_expr(SessionColumn::EndedAt, Expr::value(now))
            .filter(SessionColumn::Status.eq(String::from(SessionStatus::Active)))
            .filter(SessionColumn::LastActivityAt.lt(cutoff))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected)
    }

    /// Guarded voluntary end: any live status -> ended. Returns false when
    /// the row was already terminal (idempotent from the caller's view).
    pub async fn end_session(&self, token: &str) -> Result<bool> {
        let now: DateTimeWithTimeZone = chrono::Utc::now().into();

        let result = SessionEntity::update_many()
            .col_expr(
                SessionColumn::Status,
                Expr::value(String::from(SessionStatus::Ended)),
            )
            .col_expr(SessionColumn::QueuePosition, Expr::value(Value::Int(None)))
            .col_expr(SessionColumn::EndedAt, Expr::value(now))
            .filter(SessionColumn::Token.eq(token))
            .filter(SessionColumn::Status.is_in(["pending", "queued", "active"]))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Activity & Usage
    // ========================================================================

    /// Guarded heartbeat touch; only active sessions accumulate activity
    pub async fn touch_activity(&self, token: &str) -> Result<bool> {
        let now: DateTimeWithTimeZone = chrono::Utc::now().into();

        let result = SessionEntity::update_many()
            .col_expr(SessionColumn::LastActivityAt, Expr::value(now))
            .filter(SessionColumn::Token.eq(token))
            .filter(SessionColumn::Status.eq(String::from(SessionStatus::Active)))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Accumulate conversation usage and refresh activity in one statement
    pub async fn record_usage(&self, token: &str, cost: f64, tokens_used: i64) -> Result<bool> {
        let now: DateTimeWithTimeZone = chrono::Utc::now().into();

        let result = SessionEntity::update_many()
            .col_expr(
                SessionColumn::TotalCost,
                Expr::col(SessionColumn::TotalCost).add(cost),
            )
            .col_expr(
                SessionColumn::TotalTokensUsed,
                Expr::col(SessionColumn::TotalTokensUsed).add(tokens_used),
            )
            .col_expr(SessionColumn::LastActivityAt, Expr::value(now))
            .filter(SessionColumn::Token.eq(token))
            .filter(SessionColumn::Status.eq(String::from(SessionStatus::Active)))
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }
}
