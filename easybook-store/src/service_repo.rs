use async_trait::async_trait;
use chrono::{DateTime, Utc};
use easybook_catalog::{ContactInfo, Service, ServiceType, SlotRegistry};
use easybook_core::repository::{Page, ServiceFilter, ServiceRepository, ServiceSort, SortOrder};
use easybook_core::{CoreError, CoreResult};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::database::storage_error;

pub struct PgServiceRepository {
    pool: PgPool,
}

impl PgServiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SERVICE_COLUMNS: &str = "id, name, type, location, price, image, description, available_slots, \
     capacity, is_active, rating, review_count, amenities, contact_phone, contact_email, \
     contact_address, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ServiceRow {
    id: Uuid,
    name: String,
    #[sqlx(rename = "type")]
    service_type: String,
    location: String,
    price: i64,
    image: String,
    description: String,
    available_slots: Vec<DateTime<Utc>>,
    capacity: i32,
    is_active: bool,
    rating: f64,
    review_count: i32,
    amenities: Vec<String>,
    contact_phone: Option<String>,
    contact_email: Option<String>,
    contact_address: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ServiceRow> for Service {
    type Error = CoreError;

    fn try_from(row: ServiceRow) -> Result<Self, Self::Error> {
        let service_type: ServiceType = row.service_type.parse().map_err(CoreError::Storage)?;
        Ok(Service {
            id: row.id,
            name: row.name,
            service_type,
            location: row.location,
            price: row.price,
            image: row.image,
            description: row.description,
            available_slots: SlotRegistry::from_slots(row.available_slots),
            capacity: row.capacity,
            is_active: row.is_active,
            rating: row.rating,
            review_count: row.review_count,
            amenities: row.amenities,
            contact_info: ContactInfo {
                phone: row.contact_phone,
                email: row.contact_email,
                address: row.contact_address,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn sort_column(sort: ServiceSort) -> &'static str {
    match sort {
        ServiceSort::CreatedAt => "created_at",
        ServiceSort::Price => "price",
        ServiceSort::Rating => "rating",
        ServiceSort::Name => "name",
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ServiceFilter) {
    qb.push(" WHERE is_active = TRUE");
    if let Some(service_type) = filter.service_type {
        qb.push(" AND type = ").push_bind(service_type.as_str());
    }
    if let Some(location) = filter.location.as_deref().filter(|l| !l.is_empty()) {
        qb.push(" AND location ILIKE ").push_bind(format!("%{}%", escape_like(location)));
    }
    if let Some(min) = filter.min_price {
        qb.push(" AND price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND price <= ").push_bind(max);
    }
}

fn escape_like(input: &str) -> String {
    input.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[async_trait]
impl ServiceRepository for PgServiceRepository {
    async fn create_service(&self, service: &Service) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO services (id, name, type, location, price, image, description, available_slots,
                                  capacity, is_active, rating, review_count, amenities,
                                  contact_phone, contact_email, contact_address, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(service.id)
        .bind(&service.name)
        .bind(service.service_type.as_str())
        .bind(&service.location)
        .bind(service.price)
        .bind(&service.image)
        .bind(&service.description)
        .bind(service.available_slots.to_vec())
        .bind(service.capacity)
        .bind(service.is_active)
        .bind(service.rating)
        .bind(service.review_count)
        .bind(&service.amenities)
        .bind(&service.contact_info.phone)
        .bind(&service.contact_info.email)
        .bind(&service.contact_info.address)
        .bind(service.created_at)
        .bind(service.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn get_service(&self, id: Uuid) -> CoreResult<Option<Service>> {
        let row = sqlx::query_as::<_, ServiceRow>(&format!(
            "SELECT {} FROM services WHERE id = $1",
            SERVICE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(Service::try_from).transpose()
    }

    async fn update_details(&self, service: &Service) -> CoreResult<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE services
            SET name = $2, type = $3, location = $4, price = $5, image = $6, description = $7,
                capacity = $8, rating = $9, review_count = $10, amenities = $11,
                contact_phone = $12, contact_email = $13, contact_address = $14, updated_at = $15
            WHERE id = $1
            "#,
        )
        .bind(service.id)
        .bind(&service.name)
        .bind(service.service_type.as_str())
        .bind(&service.location)
        .bind(service.price)
        .bind(&service.image)
        .bind(&service.description)
        .bind(service.capacity)
        .bind(service.rating)
        .bind(service.review_count)
        .bind(&service.amenities)
        .bind(&service.contact_info.phone)
        .bind(&service.contact_info.email)
        .bind(&service.contact_info.address)
        .bind(service.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?
        .rows_affected();

        Ok(updated > 0)
    }

    async fn replace_slots(&self, id: Uuid, slots: &[DateTime<Utc>]) -> CoreResult<Option<usize>> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        // Same row lock a reservation's conditional UPDATE waits on.
        let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM services WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_error)?;
        if locked.is_none() {
            return Ok(None);
        }

        let held: Vec<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT time FROM bookings WHERE service_id = $1 AND status IN ('pending', 'paid')",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage_error)?;

        let mut registry = SlotRegistry::from_slots(slots.iter().copied());
        for time in held {
            registry.remove(time);
        }

        sqlx::query("UPDATE services SET available_slots = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(registry.to_vec())
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(Some(registry.len()))
    }

    async fn deactivate_service(&self, id: Uuid) -> CoreResult<bool> {
        let updated = sqlx::query("UPDATE services SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?
            .rows_affected();

        Ok(updated > 0)
    }

    async fn list_services(&self, filter: &ServiceFilter) -> CoreResult<Page<Service>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM services");
        push_filters(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM services", SERVICE_COLUMNS));
        push_filters(&mut query, filter);
        let direction = match filter.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        query.push(format!(" ORDER BY {} {}, id", sort_column(filter.sort_by), direction));
        query.push(" LIMIT ").push_bind(filter.page.limit as i64);
        query.push(" OFFSET ").push_bind(filter.page.offset() as i64);

        let rows: Vec<ServiceRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        let items = rows.into_iter().map(Service::try_from).collect::<CoreResult<Vec<_>>>()?;
        Ok(Page { items, total: total as u64 })
    }

    async fn add_slots(
        &self,
        id: Uuid,
        slots: &[DateTime<Utc>],
    ) -> CoreResult<Option<(usize, usize)>> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let current: Option<Vec<DateTime<Utc>>> =
            sqlx::query_scalar("SELECT available_slots FROM services WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage_error)?;

        let Some(current) = current else {
            return Ok(None);
        };

        let mut registry = SlotRegistry::from_slots(current);
        let added = registry.extend(slots.iter().copied());

        sqlx::query("UPDATE services SET available_slots = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(registry.to_vec())
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(Some((added, registry.len())))
    }
}
