use async_trait::async_trait;
use uuid::Uuid;
use sqlx::PgPool;
use ryde_booking::CatalogRepository;
use ryde_catalog::{Bus, Park, Route};
use ryde_core::{CoreError, CoreResult};
use crate::booking_repo::storage;

/// Read side of parks, buses and routes.
pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BusRow {
    id: Uuid,
    park_id: Uuid,
    number_plate: String,
    total_seats: i32,
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn park(&self, park_id: Uuid) -> CoreResult<Option<Park>> {
        let row: Option<(Uuid, String, Option<Uuid>)> =
            sqlx::query_as("SELECT id, name, admin_id FROM parks WHERE id = $1")
                .bind(park_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;
        Ok(row.map(|(id, name, admin_id)| Park { id, name, admin_id }))
    }

    async fn bus(&self, bus_id: Uuid) -> CoreResult<Option<Bus>> {
        let row: Option<BusRow> =
            sqlx::query_as("SELECT id, park_id, number_plate, total_seats FROM buses WHERE id = $1")
                .bind(bus_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;
        row.map(|r| {
            let total_seats = u32::try_from(r.total_seats)
                .map_err(|_| CoreError::StorageError(format!("bus {} has negative capacity", r.id)))?;
            Ok(Bus { id: r.id, park_id: r.park_id, number_plate: r.number_plate, total_seats })
        })
        .transpose()
    }

    async fn route(&self, route_id: Uuid) -> CoreResult<Option<Route>> {
        let row: Option<(Uuid, Uuid, Uuid, f64)> = sqlx::query_as(
            "SELECT id, origin_park_id, destination_park_id, distance_km FROM routes WHERE id = $1",
        )
        .bind(route_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        Ok(row.map(|(id, origin_park_id, destination_park_id, distance_km)| Route {
            id,
            origin_park_id,
            destination_park_id,
            distance_km,
        }))
    }
}
