use async_trait::async_trait;
use chrono::{DateTime, Utc};
use easybook_catalog::ServiceType;
use easybook_core::repository::{
    BookingFilter, BookingOverview, BookingRepository, BookingSort, BookingStats, Page,
    ServiceTypeStats, SortOrder,
};
use easybook_core::{Booking, BookingState, BookingStatus, CoreError, CoreResult, CustomerInfo};
use easybook_shared::Masked;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use crate::database::{is_unique_violation, storage_error};

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const BOOKING_COLUMNS: &str = "id, user_id, service_id, time, status, payment_method, amount, \
     payment_status, payment_id, customer_name, customer_phone, customer_email, customer_note, \
     admin_note, is_reminder_sent, reminder_sent_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: Uuid,
    service_id: Uuid,
    time: DateTime<Utc>,
    status: String,
    payment_method: String,
    amount: i64,
    payment_status: String,
    payment_id: Option<String>,
    customer_name: String,
    customer_phone: String,
    customer_email: String,
    customer_note: String,
    admin_note: Option<String>,
    is_reminder_sent: bool,
    reminder_sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = CoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            service_id: row.service_id,
            time: row.time,
            status: row.status.parse().map_err(CoreError::Storage)?,
            payment_method: row.payment_method.parse().map_err(CoreError::Storage)?,
            amount: row.amount,
            payment_status: row.payment_status.parse().map_err(CoreError::Storage)?,
            payment_id: row.payment_id,
            customer_info: CustomerInfo {
                name: row.customer_name,
                phone: Masked(row.customer_phone),
                email: Masked(row.customer_email),
                note: row.customer_note,
            },
            admin_note: row.admin_note,
            is_reminder_sent: row.is_reminder_sent,
            reminder_sent_at: row.reminder_sent_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OverviewRow {
    total: i64,
    pending: i64,
    paid: i64,
    cancelled: i64,
    completed: i64,
    monthly: i64,
    revenue: i64,
}

#[derive(sqlx::FromRow)]
struct TypeStatsRow {
    service_type: String,
    count: i64,
    revenue: i64,
}

fn sort_column(sort: BookingSort) -> &'static str {
    match sort {
        BookingSort::CreatedAt => "created_at",
        BookingSort::Time => "time",
        BookingSort::Amount => "amount",
        BookingSort::Status => "status",
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &BookingFilter) {
    qb.push(" WHERE TRUE");
    if let Some(user_id) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
}

fn rows_to_bookings(rows: Vec<BookingRow>) -> CoreResult<Vec<Booking>> {
    rows.into_iter().map(Booking::try_from).collect()
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn find_active_booking(
        &self,
        service_id: Uuid,
        time: DateTime<Utc>,
    ) -> CoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE service_id = $1 AND time = $2 AND status IN ('pending', 'paid')",
            BOOKING_COLUMNS
        ))
        .bind(service_id)
        .bind(time)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn create_reserved(&self, booking: &Booking) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        // Conditional removal: only one concurrent caller can see the slot present.
        let reserved = sqlx::query(
            r#"
            UPDATE services
            SET available_slots = array_remove(available_slots, $2), updated_at = NOW()
            WHERE id = $1 AND is_active = TRUE AND $2 = ANY(available_slots)
            "#,
        )
        .bind(booking.service_id)
        .bind(booking.time)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?
        .rows_affected();

        if reserved == 0 {
            debug!(service_id = %booking.service_id, time = %booking.time, "Slot no longer available");
            return Err(CoreError::SlotUnavailable(booking.time));
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO bookings (id, user_id, service_id, time, status, payment_method, amount,
                                  payment_status, payment_id, customer_name, customer_phone,
                                  customer_email, customer_note, admin_note, is_reminder_sent,
                                  reminder_sent_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(booking.id)
        .bind(booking.user_id)
        .bind(booking.service_id)
        .bind(booking.time)
        .bind(booking.status.as_str())
        .bind(booking.payment_method.as_str())
        .bind(booking.amount)
        .bind(booking.payment_status.as_str())
        .bind(&booking.payment_id)
        .bind(&booking.customer_info.name)
        .bind(booking.customer_info.phone.inner())
        .bind(booking.customer_info.email.inner())
        .bind(&booking.customer_info.note)
        .bind(&booking.admin_note)
        .bind(booking.is_reminder_sent)
        .bind(booking.reminder_sent_at)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(CoreError::DuplicateBooking(booking.time));
            }
            Err(e) => return Err(storage_error(e)),
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> CoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> CoreResult<Page<Booking>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM bookings");
        push_filters(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM bookings", BOOKING_COLUMNS));
        push_filters(&mut query, filter);
        let direction = match filter.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        query.push(format!(" ORDER BY {} {}, id", sort_column(filter.sort_by), direction));
        query.push(" LIMIT ").push_bind(filter.page.limit as i64);
        query.push(" OFFSET ").push_bind(filter.page.offset() as i64);

        let rows: Vec<BookingRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(Page { items: rows_to_bookings(rows)?, total: total as u64 })
    }

    async fn save_booking(&self, booking: &Booking, expected: BookingState) -> CoreResult<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE bookings
            SET status = $2, payment_status = $3, payment_id = $4, admin_note = $5, updated_at = $6
            WHERE id = $1 AND status = $7 AND payment_status = $8
            "#,
        )
        .bind(booking.id)
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(&booking.payment_id)
        .bind(&booking.admin_note)
        .bind(booking.updated_at)
        .bind(expected.status.as_str())
        .bind(expected.payment_status.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?
        .rows_affected();

        if updated == 0 {
            debug!(booking_id = %booking.id, "Booking changed since it was read, save skipped");
        }
        Ok(updated > 0)
    }

    async fn cancel_and_release(
        &self,
        booking: &Booking,
        allowed_from: &[BookingStatus],
    ) -> CoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM bookings WHERE id = $1 FOR UPDATE")
                .bind(booking.id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage_error)?;

        let Some(current) = current else {
            return Err(CoreError::NotFound(format!("Booking {}", booking.id)));
        };
        let current: BookingStatus = current.parse().map_err(CoreError::Storage)?;
        if !allowed_from.contains(&current) {
            return Ok(false);
        }

        sqlx::query("UPDATE bookings SET status = 'cancelled', updated_at = NOW() WHERE id = $1")
            .bind(booking.id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        if current.holds_slot() {
            sqlx::query(
                r#"
                UPDATE services
                SET available_slots = array_append(available_slots, $2), updated_at = NOW()
                WHERE id = $1 AND NOT ($2 = ANY(available_slots))
                "#,
            )
            .bind(booking.service_id)
            .bind(booking.time)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(true)
    }

    async fn due_for_reminder(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            SELECT {} FROM bookings
            WHERE time >= $1 AND time <= $2
              AND status IN ('pending', 'paid')
              AND is_reminder_sent = FALSE
            ORDER BY time
            "#,
            BOOKING_COLUMNS
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows_to_bookings(rows)
    }

    async fn mark_reminder_sent(&self, id: Uuid, at: DateTime<Utc>) -> CoreResult<()> {
        sqlx::query(
            "UPDATE bookings SET is_reminder_sent = TRUE, reminder_sent_at = $2 WHERE id = $1 AND is_reminder_sent = FALSE",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn stats(
        &self,
        month_start: DateTime<Utc>,
        month_end: DateTime<Utc>,
    ) -> CoreResult<BookingStats> {
        let overview = sqlx::query_as::<_, OverviewRow>(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                   COUNT(*) FILTER (WHERE status = 'paid') AS paid,
                   COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled,
                   COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                   COUNT(*) FILTER (WHERE created_at >= $1 AND created_at < $2) AS monthly,
                   COALESCE(SUM(amount) FILTER (WHERE status = 'paid'), 0)::BIGINT AS revenue
            FROM bookings
            "#,
        )
        .bind(month_start)
        .bind(month_end)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        let per_type = sqlx::query_as::<_, TypeStatsRow>(
            r#"
            SELECT s.type AS service_type, COUNT(*) AS count, COALESCE(SUM(b.amount), 0)::BIGINT AS revenue
            FROM bookings b
            JOIN services s ON s.id = b.service_id
            GROUP BY s.type
            ORDER BY s.type
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let service_stats = per_type
            .into_iter()
            .map(|row| {
                let service_type: ServiceType = row.service_type.parse().map_err(CoreError::Storage)?;
                Ok(ServiceTypeStats {
                    service_type,
                    count: row.count as u64,
                    revenue: row.revenue,
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(BookingStats {
            overview: BookingOverview {
                total: overview.total as u64,
                pending: overview.pending as u64,
                paid: overview.paid as u64,
                cancelled: overview.cancelled as u64,
                completed: overview.completed as u64,
                monthly: overview.monthly as u64,
                revenue: overview.revenue,
            },
            service_stats,
        })
    }
}
