use crate::errors::{AppError, Result};
use crate::models::cart::CartLine;
use crate::models::cook::{Cook, CookDish, CookDishRequest, RequestStatus};
use crate::models::delivery::DeliveryStaff;
use crate::models::food::{FoodCategory, FoodFilter, FoodItem, ServiceType};
use crate::models::notification::{Notification, NotificationType};
use crate::models::order::{
    CookAssignment, CookStatus, DeliveryVehicle, Order, OrderItem, OrderStatus,
};
use crate::models::profile::Profile;
use crate::models::settlement::{
    cook_totals, PayeeKind, Settlement, SettlementStatus, WalletTransaction,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Fixed-width UTC timestamp so stored values compare correctly as text.
pub fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn get_uuid(row: &SqliteRow, column: &str) -> Result<Uuid> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw).map_err(|e| AppError::DatabaseError(format!("Invalid {}: {}", column, e)))
}

fn get_opt_uuid(row: &SqliteRow, column: &str) -> Result<Option<Uuid>> {
    row.try_get::<Option<String>, _>(column)?
        .map(|raw| {
            Uuid::parse_str(&raw)
                .map_err(|e| AppError::DatabaseError(format!("Invalid {}: {}", column, e)))
        })
        .transpose()
}

fn get_time(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    parse_time(&raw, column)
}

fn get_opt_time(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    row.try_get::<Option<String>, _>(column)?
        .map(|raw| parse_time(&raw, column))
        .transpose()
}

fn parse_time(raw: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::DatabaseError(format!("Invalid {} date: {}", column, e)))
}

fn get_decimal(row: &SqliteRow, column: &str) -> Result<Decimal> {
    let raw: String = row.try_get(column)?;
    Ok(Decimal::from_str(&raw)?)
}

fn get_parsed<T: FromStr<Err = AppError>>(row: &SqliteRow, column: &str) -> Result<T> {
    let raw: String = row.try_get(column)?;
    raw.parse()
}

fn unique_violation(err: &sqlx::Error) -> bool {
    err.to_string().contains("UNIQUE constraint failed")
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn profile_from_row(row: &SqliteRow) -> Result<Profile> {
    Ok(Profile {
        id: get_uuid(row, "id")?,
        full_name: row.try_get("full_name")?,
        mobile_number: row.try_get("mobile_number")?,
        password_hash: row.try_get("password_hash")?,
        role: get_parsed(row, "role")?,
        panchayat: row.try_get("panchayat")?,
        ward: row.try_get("ward")?,
        created_at: get_time(row, "created_at")?,
        updated_at: get_time(row, "updated_at")?,
    })
}

fn cook_from_row(row: &SqliteRow) -> Result<Cook> {
    Ok(Cook {
        id: get_uuid(row, "id")?,
        profile_id: get_uuid(row, "profile_id")?,
        kitchen_name: row.try_get("kitchen_name")?,
        panchayat: row.try_get("panchayat")?,
        ward: row.try_get("ward")?,
        is_active: row.try_get("is_active")?,
        created_at: get_time(row, "created_at")?,
    })
}

fn cook_dish_from_row(row: &SqliteRow) -> Result<CookDish> {
    Ok(CookDish {
        id: get_uuid(row, "id")?,
        cook_id: get_uuid(row, "cook_id")?,
        food_item_id: get_uuid(row, "food_item_id")?,
        created_at: get_time(row, "created_at")?,
    })
}

fn dish_request_from_row(row: &SqliteRow) -> Result<CookDishRequest> {
    Ok(CookDishRequest {
        id: get_uuid(row, "id")?,
        cook_id: get_uuid(row, "cook_id")?,
        food_item_id: get_uuid(row, "food_item_id")?,
        status: get_parsed(row, "status")?,
        note: row.try_get("note")?,
        created_at: get_time(row, "created_at")?,
        reviewed_at: get_opt_time(row, "reviewed_at")?,
    })
}

fn staff_from_row(row: &SqliteRow) -> Result<DeliveryStaff> {
    Ok(DeliveryStaff {
        id: get_uuid(row, "id")?,
        profile_id: get_uuid(row, "profile_id")?,
        panchayats: serde_json::from_str(&row.try_get::<String, _>("panchayats")?)?,
        wards: serde_json::from_str(&row.try_get::<String, _>("wards")?)?,
        is_active: row.try_get("is_active")?,
        created_at: get_time(row, "created_at")?,
    })
}

fn category_from_row(row: &SqliteRow) -> Result<FoodCategory> {
    Ok(FoodCategory {
        id: get_uuid(row, "id")?,
        name: row.try_get("name")?,
        service_type: get_parsed(row, "service_type")?,
        created_at: get_time(row, "created_at")?,
    })
}

fn food_from_row(row: &SqliteRow) -> Result<FoodItem> {
    Ok(FoodItem {
        id: get_uuid(row, "id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price: get_decimal(row, "price")?,
        category_id: get_opt_uuid(row, "category_id")?,
        service_type: get_parsed(row, "service_type")?,
        image_urls: serde_json::from_str(&row.try_get::<String, _>("image_urls")?)?,
        is_available: row.try_get("is_available")?,
        created_at: get_time(row, "created_at")?,
        updated_at: get_time(row, "updated_at")?,
    })
}

fn order_from_row(row: &SqliteRow) -> Result<Order> {
    Ok(Order {
        id: get_uuid(row, "id")?,
        customer_id: get_uuid(row, "customer_id")?,
        service_type: get_parsed(row, "service_type")?,
        status: get_parsed(row, "status")?,
        panchayat: row.try_get("panchayat")?,
        ward: row.try_get("ward")?,
        delivery_address: row.try_get("delivery_address")?,
        delivery_charge: get_decimal(row, "delivery_charge")?,
        total_amount: get_decimal(row, "total_amount")?,
        delivery_staff_id: get_opt_uuid(row, "delivery_staff_id")?,
        event_details: row
            .try_get::<Option<String>, _>("event_details")?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()?,
        notes: row.try_get("notes")?,
        created_at: get_time(row, "created_at")?,
        updated_at: get_time(row, "updated_at")?,
        delivered_at: get_opt_time(row, "delivered_at")?,
    })
}

fn order_item_from_row(row: &SqliteRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: get_uuid(row, "id")?,
        order_id: get_uuid(row, "order_id")?,
        food_item_id: get_uuid(row, "food_item_id")?,
        food_name: row.try_get("food_name")?,
        quantity: row.try_get("quantity")?,
        unit_price: get_decimal(row, "unit_price")?,
        total_price: get_decimal(row, "total_price")?,
        cook_id: get_opt_uuid(row, "cook_id")?,
    })
}

fn assignment_from_row(row: &SqliteRow) -> Result<CookAssignment> {
    Ok(CookAssignment {
        id: get_uuid(row, "id")?,
        order_id: get_uuid(row, "order_id")?,
        cook_id: get_uuid(row, "cook_id")?,
        status: get_parsed(row, "status")?,
        assigned_at: get_time(row, "assigned_at")?,
        respond_by: get_time(row, "respond_by")?,
        responded_at: get_opt_time(row, "responded_at")?,
    })
}

fn vehicle_from_row(row: &SqliteRow) -> Result<DeliveryVehicle> {
    Ok(DeliveryVehicle {
        id: get_uuid(row, "id")?,
        order_id: get_uuid(row, "order_id")?,
        staff_id: get_uuid(row, "staff_id")?,
        vehicle_type: row.try_get("vehicle_type")?,
        vehicle_number: row.try_get("vehicle_number")?,
        recorded_at: get_time(row, "recorded_at")?,
    })
}

fn settlement_from_row(row: &SqliteRow) -> Result<Settlement> {
    Ok(Settlement {
        id: get_uuid(row, "id")?,
        order_id: get_uuid(row, "order_id")?,
        payee_kind: get_parsed(row, "payee_kind")?,
        payee_id: get_uuid(row, "payee_id")?,
        amount: get_decimal(row, "amount")?,
        status: get_parsed(row, "status")?,
        created_at: get_time(row, "created_at")?,
        approved_at: get_opt_time(row, "approved_at")?,
        approved_by: get_opt_uuid(row, "approved_by")?,
    })
}

fn wallet_tx_from_row(row: &SqliteRow) -> Result<WalletTransaction> {
    Ok(WalletTransaction {
        id: get_uuid(row, "id")?,
        payee_kind: get_parsed(row, "payee_kind")?,
        payee_id: get_uuid(row, "payee_id")?,
        settlement_id: get_opt_uuid(row, "settlement_id")?,
        amount: get_decimal(row, "amount")?,
        description: row.try_get("description")?,
        created_at: get_time(row, "created_at")?,
    })
}

fn notification_from_row(row: &SqliteRow) -> Result<Notification> {
    Ok(Notification {
        id: get_uuid(row, "id")?,
        profile_id: get_uuid(row, "profile_id")?,
        notification_type: NotificationType::parse(&row.try_get::<String, _>("notification_type")?),
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        metadata: row
            .try_get::<Option<String>, _>("metadata")?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()?,
        is_read: row.try_get("is_read")?,
        created_at: get_time(row, "created_at")?,
    })
}

/// Filters accepted by [`SqliteDatabase::list_orders`].
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    pub customer_id: Option<Uuid>,
    pub cook_id: Option<Uuid>,
    pub delivery_staff_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub service_type: Option<ServiceType>,
    pub limit: Option<i64>,
}

/// Outcome of releasing a cook assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub released_items: u64,
    /// The order fell back to `confirmed` because no live assignment remained.
    pub order_reverted: bool,
}

#[derive(Debug)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    pub async fn new(database_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::DatabaseError(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let database_url = format!("sqlite:{}?mode=rwc", database_path);
        let pool = SqlitePool::connect(&database_url)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect to database: {}", e)))?;

        let db = Self { pool };
        db.create_tables().await?;

        info!(action = "database_connected", path = %database_path);
        Ok(db)
    }

    /// A private in-memory database; a single pooled connection keeps it alive.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self { pool };
        db.create_tables().await?;
        Ok(db)
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create_tables(&self) -> Result<()> {
        let query = r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                full_name TEXT NOT NULL,
                mobile_number TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                panchayat TEXT,
                ward INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cooks (
                id TEXT PRIMARY KEY,
                profile_id TEXT UNIQUE NOT NULL,
                kitchen_name TEXT NOT NULL,
                panchayat TEXT NOT NULL,
                ward INTEGER NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TEXT NOT NULL,
                FOREIGN KEY (profile_id) REFERENCES profiles (id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS delivery_staff (
                id TEXT PRIMARY KEY,
                profile_id TEXT UNIQUE NOT NULL,
                panchayats TEXT NOT NULL,
                wards TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TEXT NOT NULL,
                FOREIGN KEY (profile_id) REFERENCES profiles (id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS food_categories (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                service_type TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (name, service_type)
            );

            CREATE TABLE IF NOT EXISTS food_items (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                price TEXT NOT NULL,
                category_id TEXT,
                service_type TEXT NOT NULL,
                image_urls TEXT NOT NULL DEFAULT '[]',
                is_available BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (category_id) REFERENCES food_categories (id) ON DELETE SET NULL
            );

            CREATE TABLE IF NOT EXISTS cook_dishes (
                id TEXT PRIMARY KEY,
                cook_id TEXT NOT NULL,
                food_item_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (cook_id, food_item_id),
                FOREIGN KEY (cook_id) REFERENCES cooks (id) ON DELETE CASCADE,
                FOREIGN KEY (food_item_id) REFERENCES food_items (id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS cook_dish_requests (
                id TEXT PRIMARY KEY,
                cook_id TEXT NOT NULL,
                food_item_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending', -- 'pending', 'approved', 'rejected'
                note TEXT,
                created_at TEXT NOT NULL,
                reviewed_at TEXT,
                FOREIGN KEY (cook_id) REFERENCES cooks (id) ON DELETE CASCADE,
                FOREIGN KEY (food_item_id) REFERENCES food_items (id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS cart_items (
                id TEXT PRIMARY KEY,
                customer_id TEXT NOT NULL,
                food_item_id TEXT NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                added_at TEXT NOT NULL,
                UNIQUE (customer_id, food_item_id),
                FOREIGN KEY (customer_id) REFERENCES profiles (id) ON DELETE CASCADE,
                FOREIGN KEY (food_item_id) REFERENCES food_items (id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                customer_id TEXT NOT NULL,
                service_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                panchayat TEXT NOT NULL,
                ward INTEGER NOT NULL,
                delivery_address TEXT NOT NULL,
                delivery_charge TEXT NOT NULL,
                total_amount TEXT NOT NULL,
                delivery_staff_id TEXT,
                event_details TEXT,
                notes TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                delivered_at TEXT,
                FOREIGN KEY (customer_id) REFERENCES profiles (id),
                FOREIGN KEY (delivery_staff_id) REFERENCES delivery_staff (id)
            );

            CREATE TABLE IF NOT EXISTS order_items (
                id TEXT PRIMARY KEY,
                order_id TEXT NOT NULL,
                food_item_id TEXT NOT NULL,
                food_name TEXT NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                unit_price TEXT NOT NULL,
                total_price TEXT NOT NULL,
                cook_id TEXT,
                FOREIGN KEY (order_id) REFERENCES orders (id) ON DELETE CASCADE,
                FOREIGN KEY (food_item_id) REFERENCES food_items (id),
                FOREIGN KEY (cook_id) REFERENCES cooks (id)
            );

            CREATE TABLE IF NOT EXISTS cook_assignments (
                id TEXT PRIMARY KEY,
                order_id TEXT NOT NULL,
                cook_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending', -- 'pending', 'accepted', 'rejected', 'timed_out', 'cancelled'
                assigned_at TEXT NOT NULL,
                respond_by TEXT NOT NULL,
                responded_at TEXT,
                FOREIGN KEY (order_id) REFERENCES orders (id) ON DELETE CASCADE,
                FOREIGN KEY (cook_id) REFERENCES cooks (id)
            );

            CREATE TABLE IF NOT EXISTS delivery_vehicles (
                id TEXT PRIMARY KEY,
                order_id TEXT UNIQUE NOT NULL,
                staff_id TEXT NOT NULL,
                vehicle_type TEXT NOT NULL,
                vehicle_number TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                FOREIGN KEY (order_id) REFERENCES orders (id) ON DELETE CASCADE,
                FOREIGN KEY (staff_id) REFERENCES delivery_staff (id)
            );

            CREATE TABLE IF NOT EXISTS settlements (
                id TEXT PRIMARY KEY,
                order_id TEXT NOT NULL,
                payee_kind TEXT NOT NULL, -- 'cook', 'delivery'
                payee_id TEXT NOT NULL,
                amount TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending', -- 'pending', 'approved'
                created_at TEXT NOT NULL,
                approved_at TEXT,
                approved_by TEXT,
                UNIQUE (order_id, payee_kind, payee_id),
                FOREIGN KEY (order_id) REFERENCES orders (id)
            );

            CREATE TABLE IF NOT EXISTS wallet_transactions (
                id TEXT PRIMARY KEY,
                payee_kind TEXT NOT NULL,
                payee_id TEXT NOT NULL,
                settlement_id TEXT UNIQUE,
                amount TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (settlement_id) REFERENCES settlements (id)
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                profile_id TEXT NOT NULL,
                notification_type TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                metadata TEXT,
                is_read BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TEXT NOT NULL,
                FOREIGN KEY (profile_id) REFERENCES profiles (id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_profiles_mobile ON profiles(mobile_number);
            CREATE INDEX IF NOT EXISTS idx_food_items_service ON food_items(service_type);
            CREATE INDEX IF NOT EXISTS idx_cook_dishes_cook ON cook_dishes(cook_id);
            CREATE INDEX IF NOT EXISTS idx_cart_customer ON cart_items(customer_id);
            CREATE INDEX IF NOT EXISTS idx_orders_customer ON orders(customer_id);
            CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);
            CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id);
            CREATE INDEX IF NOT EXISTS idx_order_items_cook ON order_items(cook_id);
            CREATE INDEX IF NOT EXISTS idx_assignments_order ON cook_assignments(order_id);
            CREATE INDEX IF NOT EXISTS idx_assignments_status ON cook_assignments(status);
            CREATE INDEX IF NOT EXISTS idx_settlements_status ON settlements(status);
            CREATE INDEX IF NOT EXISTS idx_settlements_payee ON settlements(payee_kind, payee_id);
            CREATE INDEX IF NOT EXISTS idx_wallet_payee ON wallet_transactions(payee_kind, payee_id);
            CREATE INDEX IF NOT EXISTS idx_notifications_profile ON notifications(profile_id);
        "#;

        sqlx::query(query)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create tables: {}", e)))?;

        debug!(action = "database_schema_ready");
        Ok(())
    }

    // Profiles

    pub async fn create_profile(&self, profile: &Profile) -> Result<()> {
        let query = r#"
            INSERT INTO profiles (id, full_name, mobile_number, password_hash, role, panchayat, ward, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#;

        sqlx::query(query)
            .bind(profile.id.to_string())
            .bind(&profile.full_name)
            .bind(&profile.mobile_number)
            .bind(&profile.password_hash)
            .bind(profile.role.as_str())
            .bind(&profile.panchayat)
            .bind(profile.ward)
            .bind(ts(profile.created_at))
            .bind(ts(profile.updated_at))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if unique_violation(&e) {
                    AppError::Conflict("Mobile number already registered".to_string())
                } else {
                    AppError::DatabaseError(format!("Failed to create profile: {}", e))
                }
            })?;

        Ok(())
    }

    pub async fn get_profile_by_id(&self, id: &Uuid) -> Result<Profile> {
        let row = sqlx::query("SELECT * FROM profiles WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", id)))?;
        profile_from_row(&row)
    }

    pub async fn get_profile_by_mobile(&self, mobile_number: &str) -> Result<Option<Profile>> {
        let row = sqlx::query("SELECT * FROM profiles WHERE mobile_number = ?1")
            .bind(mobile_number)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(profile_from_row).transpose()
    }

    // Cooks and dish allocation

    pub async fn create_cook(&self, cook: &Cook) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cooks (id, profile_id, kitchen_name, panchayat, ward, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(cook.id.to_string())
        .bind(cook.profile_id.to_string())
        .bind(&cook.kitchen_name)
        .bind(&cook.panchayat)
        .bind(cook.ward)
        .bind(cook.is_active)
        .bind(ts(cook.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if unique_violation(&e) {
                AppError::Conflict("Profile is already registered as a cook".to_string())
            } else {
                AppError::DatabaseError(format!("Failed to create cook: {}", e))
            }
        })?;
        Ok(())
    }

    pub async fn get_cook(&self, id: &Uuid) -> Result<Cook> {
        let row = sqlx::query("SELECT * FROM cooks WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Cook {} not found", id)))?;
        cook_from_row(&row)
    }

    pub async fn get_cook_by_profile(&self, profile_id: &Uuid) -> Result<Option<Cook>> {
        let row = sqlx::query("SELECT * FROM cooks WHERE profile_id = ?1")
            .bind(profile_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(cook_from_row).transpose()
    }

    pub async fn list_cooks(&self, active_only: bool) -> Result<Vec<Cook>> {
        let query = if active_only {
            "SELECT * FROM cooks WHERE is_active = TRUE ORDER BY kitchen_name"
        } else {
            "SELECT * FROM cooks ORDER BY kitchen_name"
        };
        let rows = sqlx::query(query).fetch_all(&self.pool).await?;
        rows.iter().map(cook_from_row).collect()
    }

    pub async fn set_cook_active(&self, id: &Uuid, is_active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE cooks SET is_active = ?1 WHERE id = ?2")
            .bind(is_active)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Cook {} not found", id)));
        }
        Ok(())
    }

    pub async fn allocate_dish(&self, dish: &CookDish) -> Result<()> {
        sqlx::query(
            "INSERT INTO cook_dishes (id, cook_id, food_item_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(dish.id.to_string())
        .bind(dish.cook_id.to_string())
        .bind(dish.food_item_id.to_string())
        .bind(ts(dish.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if unique_violation(&e) {
                AppError::Conflict("Dish is already allocated to this cook".to_string())
            } else {
                AppError::DatabaseError(format!("Failed to allocate dish: {}", e))
            }
        })?;
        Ok(())
    }

    pub async fn list_cook_dishes(&self, cook_id: &Uuid) -> Result<Vec<CookDish>> {
        let rows = sqlx::query("SELECT * FROM cook_dishes WHERE cook_id = ?1 ORDER BY created_at")
            .bind(cook_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(cook_dish_from_row).collect()
    }

    /// Every (cook, food item) allocation of active cooks.
    pub async fn active_cook_dish_pairs(&self) -> Result<Vec<(Uuid, Uuid)>> {
        let rows = sqlx::query(
            r#"
            SELECT cd.cook_id, cd.food_item_id
            FROM cook_dishes cd
            JOIN cooks c ON c.id = cd.cook_id
            WHERE c.is_active = TRUE
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| Ok((get_uuid(row, "cook_id")?, get_uuid(row, "food_item_id")?)))
            .collect()
    }

    pub async fn create_dish_request(&self, request: &CookDishRequest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cook_dish_requests (id, cook_id, food_item_id, status, note, created_at, reviewed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(request.id.to_string())
        .bind(request.cook_id.to_string())
        .bind(request.food_item_id.to_string())
        .bind(request.status.as_str())
        .bind(&request.note)
        .bind(ts(request.created_at))
        .bind(request.reviewed_at.map(ts))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn has_pending_dish_request(&self, cook_id: &Uuid, food_item_id: &Uuid) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM cook_dish_requests WHERE cook_id = ?1 AND food_item_id = ?2 AND status = 'pending'",
        )
        .bind(cook_id.to_string())
        .bind(food_item_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn get_dish_request(&self, id: &Uuid) -> Result<CookDishRequest> {
        let row = sqlx::query("SELECT * FROM cook_dish_requests WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Dish request {} not found", id)))?;
        dish_request_from_row(&row)
    }

    pub async fn list_dish_requests(
        &self,
        status: Option<RequestStatus>,
        cook_id: Option<&Uuid>,
    ) -> Result<Vec<CookDishRequest>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM cook_dish_requests
            WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR cook_id = ?2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(cook_id.map(|id| id.to_string()))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(dish_request_from_row).collect()
    }

    /// Closes a pending request; approval also writes the allocation, in one transaction.
    pub async fn review_dish_request(
        &self,
        id: &Uuid,
        approve: bool,
        now: DateTime<Utc>,
    ) -> Result<CookDishRequest> {
        let mut tx = self.pool.begin().await?;
        let status = if approve { RequestStatus::Approved } else { RequestStatus::Rejected };

        let result = sqlx::query(
            "UPDATE cook_dish_requests SET status = ?1, reviewed_at = ?2 WHERE id = ?3 AND status = 'pending'",
        )
        .bind(status.as_str())
        .bind(ts(now))
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "Dish request {} is missing or already reviewed",
                id
            )));
        }

        let row = sqlx::query("SELECT * FROM cook_dish_requests WHERE id = ?1")
            .bind(id.to_string())
            .fetch_one(&mut *tx)
            .await?;
        let request = dish_request_from_row(&row)?;

        if approve {
            sqlx::query(
                r#"
                INSERT INTO cook_dishes (id, cook_id, food_item_id, created_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT (cook_id, food_item_id) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(request.cook_id.to_string())
            .bind(request.food_item_id.to_string())
            .bind(ts(now))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(request)
    }

    // Delivery staff

    pub async fn create_delivery_staff(&self, staff: &DeliveryStaff) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO delivery_staff (id, profile_id, panchayats, wards, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(staff.id.to_string())
        .bind(staff.profile_id.to_string())
        .bind(serde_json::to_string(&staff.panchayats)?)
        .bind(serde_json::to_string(&staff.wards)?)
        .bind(staff.is_active)
        .bind(ts(staff.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if unique_violation(&e) {
                AppError::Conflict("Profile is already registered as delivery staff".to_string())
            } else {
                AppError::DatabaseError(format!("Failed to create delivery staff: {}", e))
            }
        })?;
        Ok(())
    }

    pub async fn get_delivery_staff(&self, id: &Uuid) -> Result<DeliveryStaff> {
        let row = sqlx::query("SELECT * FROM delivery_staff WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Delivery staff {} not found", id)))?;
        staff_from_row(&row)
    }

    pub async fn get_delivery_staff_by_profile(&self, profile_id: &Uuid) -> Result<Option<DeliveryStaff>> {
        let row = sqlx::query("SELECT * FROM delivery_staff WHERE profile_id = ?1")
            .bind(profile_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(staff_from_row).transpose()
    }

    pub async fn list_delivery_staff(&self, active_only: bool) -> Result<Vec<DeliveryStaff>> {
        let query = if active_only {
            "SELECT * FROM delivery_staff WHERE is_active = TRUE ORDER BY created_at"
        } else {
            "SELECT * FROM delivery_staff ORDER BY created_at"
        };
        let rows = sqlx::query(query).fetch_all(&self.pool).await?;
        rows.iter().map(staff_from_row).collect()
    }

    // Catalog

    pub async fn create_category(&self, category: &FoodCategory) -> Result<()> {
        sqlx::query(
            "INSERT INTO food_categories (id, name, service_type, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(category.id.to_string())
        .bind(&category.name)
        .bind(category.service_type.as_str())
        .bind(ts(category.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if unique_violation(&e) {
                AppError::Conflict(format!("Category '{}' already exists", category.name))
            } else {
                AppError::DatabaseError(format!("Failed to create category: {}", e))
            }
        })?;
        Ok(())
    }

    pub async fn get_category(&self, id: &Uuid) -> Result<FoodCategory> {
        let row = sqlx::query("SELECT * FROM food_categories WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Category {} not found", id)))?;
        category_from_row(&row)
    }

    pub async fn list_categories(&self, service_type: Option<ServiceType>) -> Result<Vec<FoodCategory>> {
        let rows = sqlx::query(
            "SELECT * FROM food_categories WHERE (?1 IS NULL OR service_type = ?1) ORDER BY name",
        )
        .bind(service_type.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(category_from_row).collect()
    }

    pub async fn create_food_item(&self, item: &FoodItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO food_items (id, name, description, price, category_id, service_type, image_urls, is_available, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(item.id.to_string())
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.price.to_string())
        .bind(item.category_id.map(|id| id.to_string()))
        .bind(item.service_type.as_str())
        .bind(serde_json::to_string(&item.image_urls)?)
        .bind(item.is_available)
        .bind(ts(item.created_at))
        .bind(ts(item.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_food_item(&self, id: &Uuid) -> Result<FoodItem> {
        let row = sqlx::query("SELECT * FROM food_items WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Food item {} not found", id)))?;
        food_from_row(&row)
    }

    pub async fn list_food_items(&self, filter: &FoodFilter) -> Result<Vec<FoodItem>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM food_items
            WHERE (?1 IS NULL OR service_type = ?1)
              AND (?2 IS NULL OR category_id = ?2)
              AND (?3 = FALSE OR is_available = TRUE)
            ORDER BY name
            "#,
        )
        .bind(filter.service_type.map(|s| s.as_str()))
        .bind(filter.category_id.map(|id| id.to_string()))
        .bind(filter.available_only.unwrap_or(false))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(food_from_row).collect()
    }

    pub async fn set_food_availability(&self, id: &Uuid, is_available: bool, now: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE food_items SET is_available = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(is_available)
            .bind(ts(now))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Food item {} not found", id)));
        }
        Ok(())
    }

    // Cart

    /// Adds `quantity` to the customer's line for this food, creating it if needed.
    /// A merge that would push the line past `max_quantity` changes nothing.
    pub async fn add_to_cart(
        &self,
        customer_id: &Uuid,
        food_item_id: &Uuid,
        quantity: i32,
        max_quantity: i32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO cart_items (id, customer_id, food_item_id, quantity, added_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (customer_id, food_item_id) DO UPDATE
                SET quantity = cart_items.quantity + excluded.quantity
                WHERE cart_items.quantity + excluded.quantity <= ?6
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(customer_id.to_string())
        .bind(food_item_id.to_string())
        .bind(quantity)
        .bind(ts(now))
        .bind(max_quantity)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::ValidationError(format!(
                "A cart line can hold at most {} of one item",
                max_quantity
            )));
        }
        Ok(())
    }

    pub async fn set_cart_quantity(&self, customer_id: &Uuid, cart_item_id: &Uuid, quantity: i32) -> Result<()> {
        let result = if quantity <= 0 {
            sqlx::query("DELETE FROM cart_items WHERE id = ?1 AND customer_id = ?2")
                .bind(cart_item_id.to_string())
                .bind(customer_id.to_string())
                .execute(&self.pool)
                .await?
        } else {
            sqlx::query("UPDATE cart_items SET quantity = ?1 WHERE id = ?2 AND customer_id = ?3")
                .bind(quantity)
                .bind(cart_item_id.to_string())
                .bind(customer_id.to_string())
                .execute(&self.pool)
                .await?
        };
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Cart item {} not found", cart_item_id)));
        }
        Ok(())
    }

    pub async fn clear_cart(&self, customer_id: &Uuid) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE customer_id = ?1")
            .bind(customer_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_cart_lines(&self, customer_id: &Uuid) -> Result<Vec<CartLine>> {
        let rows = sqlx::query(
            r#"
            SELECT ci.id, ci.food_item_id, ci.quantity, f.name, f.service_type, f.price, f.is_available
            FROM cart_items ci
            JOIN food_items f ON f.id = ci.food_item_id
            WHERE ci.customer_id = ?1
            ORDER BY ci.added_at
            "#,
        )
        .bind(customer_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(CartLine {
                    id: get_uuid(row, "id")?,
                    food_item_id: get_uuid(row, "food_item_id")?,
                    food_name: row.try_get("name")?,
                    service_type: get_parsed(row, "service_type")?,
                    unit_price: get_decimal(row, "price")?,
                    quantity: row.try_get("quantity")?,
                    is_available: row.try_get("is_available")?,
                })
            })
            .collect()
    }

    // Orders

    /// Writes the order with its lines and removes the priced cart lines in one
    /// transaction. `priced` holds each cart line id with the quantity that was
    /// ordered; a line that changed since pricing aborts the checkout.
    pub async fn place_order(&self, order: &Order, items: &[OrderItem], priced: &[(Uuid, i32)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, service_type, status, panchayat, ward, delivery_address,
                                delivery_charge, total_amount, delivery_staff_id, event_details, notes,
                                created_at, updated_at, delivered_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(order.id.to_string())
        .bind(order.customer_id.to_string())
        .bind(order.service_type.as_str())
        .bind(order.status.as_str())
        .bind(&order.panchayat)
        .bind(order.ward)
        .bind(&order.delivery_address)
        .bind(order.delivery_charge.to_string())
        .bind(order.total_amount.to_string())
        .bind(order.delivery_staff_id.map(|id| id.to_string()))
        .bind(order.event_details.as_ref().map(serde_json::to_string).transpose()?)
        .bind(&order.notes)
        .bind(ts(order.created_at))
        .bind(ts(order.updated_at))
        .bind(order.delivered_at.map(ts))
        .execute(&mut *tx)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, food_item_id, food_name, quantity, unit_price, total_price, cook_id)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(item.id.to_string())
            .bind(item.order_id.to_string())
            .bind(item.food_item_id.to_string())
            .bind(&item.food_name)
            .bind(item.quantity)
            .bind(item.unit_price.to_string())
            .bind(item.total_price.to_string())
            .bind(item.cook_id.map(|id| id.to_string()))
            .execute(&mut *tx)
            .await?;
        }

        for (cart_item_id, quantity) in priced {
            let removed = sqlx::query("DELETE FROM cart_items WHERE id = ?1 AND customer_id = ?2 AND quantity = ?3")
                .bind(cart_item_id.to_string())
                .bind(order.customer_id.to_string())
                .bind(quantity)
                .execute(&mut *tx)
                .await?;
            if removed.rows_affected() == 0 {
                return Err(AppError::Conflict(
                    "Cart changed during checkout; review it and try again".to_string(),
                ));
            }
        }

        tx.commit().await?;
        info!(action = "order_placed", order_id = %order.id, items = items.len());
        Ok(())
    }

    pub async fn get_order(&self, id: &Uuid) -> Result<Order> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", id)))?;
        order_from_row(&row)
    }

    pub async fn get_order_items(&self, order_id: &Uuid) -> Result<Vec<OrderItem>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order_items(&mut conn, order_id).await
    }

    pub async fn get_cook_assignments(&self, order_id: &Uuid) -> Result<Vec<CookAssignment>> {
        let rows = sqlx::query("SELECT * FROM cook_assignments WHERE order_id = ?1 ORDER BY assigned_at")
            .bind(order_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(assignment_from_row).collect()
    }

    pub async fn get_cook_assignment(&self, id: &Uuid) -> Result<CookAssignment> {
        let row = sqlx::query("SELECT * FROM cook_assignments WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Cook assignment {} not found", id)))?;
        assignment_from_row(&row)
    }

    pub async fn get_vehicle(&self, order_id: &Uuid) -> Result<Option<DeliveryVehicle>> {
        let row = sqlx::query("SELECT * FROM delivery_vehicles WHERE order_id = ?1")
            .bind(order_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(vehicle_from_row).transpose()
    }

    pub async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let sql = format!(
            r#"
            SELECT o.* FROM orders o
            WHERE (?1 IS NULL OR o.customer_id = ?1)
              AND (?2 IS NULL OR EXISTS (SELECT 1 FROM order_items oi WHERE oi.order_id = o.id AND oi.cook_id = ?2)
                              OR EXISTS (SELECT 1 FROM cook_assignments ca WHERE ca.order_id = o.id AND ca.cook_id = ?2))
              AND (?3 IS NULL OR o.delivery_staff_id = ?3)
              AND (?4 IS NULL OR o.status = ?4)
              AND (?5 IS NULL OR o.service_type = ?5)
            ORDER BY o.created_at DESC
            {}
            "#,
            query.limit.map(|l| format!("LIMIT {}", l.max(0))).unwrap_or_default()
        );

        let rows = sqlx::query(&sql)
            .bind(query.customer_id.map(|id| id.to_string()))
            .bind(query.cook_id.map(|id| id.to_string()))
            .bind(query.delivery_staff_id.map(|id| id.to_string()))
            .bind(query.status.map(|s| s.as_str()))
            .bind(query.service_type.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(order_from_row).collect()
    }

    /// Conditional status update: succeeds only if the stored status is one of `from`.
    pub async fn update_order_status(
        &self,
        order_id: &Uuid,
        from: &[OrderStatus],
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        set_status(&mut conn, order_id, from, to, now).await
    }

    /// Attaches items to cooks, records their assignments and moves the order to `preparing`.
    pub async fn assign_cooks(
        &self,
        order_id: &Uuid,
        item_cooks: &[(Uuid, Uuid)],
        assignments: &[CookAssignment],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        set_status(
            &mut tx,
            order_id,
            &[OrderStatus::Confirmed, OrderStatus::Preparing],
            OrderStatus::Preparing,
            now,
        )
        .await?;

        for (item_id, cook_id) in item_cooks {
            let result = sqlx::query(
                "UPDATE order_items SET cook_id = ?1 WHERE id = ?2 AND order_id = ?3 AND cook_id IS NULL",
            )
            .bind(cook_id.to_string())
            .bind(item_id.to_string())
            .bind(order_id.to_string())
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(AppError::Conflict(format!(
                    "Order item {} is missing or already assigned",
                    item_id
                )));
            }
        }

        for assignment in assignments {
            sqlx::query(
                r#"
                INSERT INTO cook_assignments (id, order_id, cook_id, status, assigned_at, respond_by, responded_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(assignment.id.to_string())
            .bind(assignment.order_id.to_string())
            .bind(assignment.cook_id.to_string())
            .bind(assignment.status.as_str())
            .bind(ts(assignment.assigned_at))
            .bind(ts(assignment.respond_by))
            .bind(assignment.responded_at.map(ts))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Accepts a pending assignment whose response window is still open.
    /// Returns false when nothing matched (already answered, or expired).
    pub async fn accept_assignment(&self, assignment_id: &Uuid, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE cook_assignments SET status = 'accepted', responded_at = ?1
            WHERE id = ?2 AND status = 'pending' AND respond_by >= ?1
            "#,
        )
        .bind(ts(now))
        .bind(assignment_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Closes a pending assignment as `outcome`, frees its items, and reverts the
    /// order to `confirmed` when no live assignment is left.
    pub async fn release_assignment(
        &self,
        assignment_id: &Uuid,
        outcome: CookStatus,
        now: DateTime<Utc>,
    ) -> Result<Release> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM cook_assignments WHERE id = ?1")
            .bind(assignment_id.to_string())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Cook assignment {} not found", assignment_id)))?;
        let assignment = assignment_from_row(&row)?;

        let result = sqlx::query(
            "UPDATE cook_assignments SET status = ?1, responded_at = ?2 WHERE id = ?3 AND status = 'pending'",
        )
        .bind(outcome.as_str())
        .bind(ts(now))
        .bind(assignment_id.to_string())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "Cook assignment {} was already answered",
                assignment_id
            )));
        }

        let released = sqlx::query("UPDATE order_items SET cook_id = NULL WHERE order_id = ?1 AND cook_id = ?2")
            .bind(assignment.order_id.to_string())
            .bind(assignment.cook_id.to_string())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let live: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM cook_assignments WHERE order_id = ?1 AND status IN ('pending', 'accepted')",
        )
        .bind(assignment.order_id.to_string())
        .fetch_one(&mut *tx)
        .await?;

        let mut order_reverted = false;
        if live == 0 {
            order_reverted = sqlx::query(
                "UPDATE orders SET status = 'confirmed', updated_at = ?1 WHERE id = ?2 AND status = 'preparing'",
            )
            .bind(ts(now))
            .bind(assignment.order_id.to_string())
            .execute(&mut *tx)
            .await?
            .rows_affected()
                == 1;
        }

        tx.commit().await?;
        Ok(Release {
            released_items: released,
            order_reverted,
        })
    }

    pub async fn list_expired_assignments(&self, now: DateTime<Utc>) -> Result<Vec<CookAssignment>> {
        let rows = sqlx::query(
            "SELECT * FROM cook_assignments WHERE status = 'pending' AND respond_by < ?1 ORDER BY respond_by",
        )
        .bind(ts(now))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(assignment_from_row).collect()
    }

    /// `preparing -> ready`, only once every item sits with a cook who accepted.
    pub async fn mark_ready(&self, order_id: &Uuid, now: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let unassigned: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM order_items WHERE order_id = ?1 AND cook_id IS NULL",
        )
        .bind(order_id.to_string())
        .fetch_one(&mut *tx)
        .await?;
        let awaiting: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM cook_assignments WHERE order_id = ?1 AND status = 'pending'",
        )
        .bind(order_id.to_string())
        .fetch_one(&mut *tx)
        .await?;
        if unassigned > 0 || awaiting > 0 {
            return Err(AppError::InvalidTransition(format!(
                "order {} still has {} unassigned item(s) and {} unanswered assignment(s)",
                order_id, unassigned, awaiting
            )));
        }

        set_status(&mut tx, order_id, &[OrderStatus::Preparing], OrderStatus::Ready, now).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Compare-and-set on the delivery slot; false when another agent already holds it
    /// or the order is not in a deliverable state.
    pub async fn attach_delivery_staff(&self, order_id: &Uuid, staff_id: &Uuid, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET delivery_staff_id = ?1, updated_at = ?2
            WHERE id = ?3 AND delivery_staff_id IS NULL AND status IN ('preparing', 'ready')
            "#,
        )
        .bind(staff_id.to_string())
        .bind(ts(now))
        .bind(order_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// `ready -> out_for_delivery` together with the vehicle record.
    pub async fn dispatch_order(&self, vehicle: &DeliveryVehicle, now: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE orders SET status = 'out_for_delivery', updated_at = ?1
            WHERE id = ?2 AND status = 'ready' AND delivery_staff_id = ?3
            "#,
        )
        .bind(ts(now))
        .bind(vehicle.order_id.to_string())
        .bind(vehicle.staff_id.to_string())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::InvalidTransition(format!(
                "order {} is not ready for this delivery agent",
                vehicle.order_id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO delivery_vehicles (id, order_id, staff_id, vehicle_type, vehicle_number, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(vehicle.id.to_string())
        .bind(vehicle.order_id.to_string())
        .bind(vehicle.staff_id.to_string())
        .bind(&vehicle.vehicle_type)
        .bind(&vehicle.vehicle_number)
        .bind(ts(vehicle.recorded_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// `out_for_delivery -> delivered` and the settlement rows, in one transaction.
    /// One pending settlement per cook (sum of that cook's item totals) and one for the
    /// delivery agent when the order carries a delivery charge.
    pub async fn complete_delivery(&self, order_id: &Uuid, now: DateTime<Utc>) -> Result<Vec<Settlement>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT * FROM orders WHERE id = ?1")
            .bind(order_id.to_string())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;
        let order = order_from_row(&row)?;
        order.status.transition(OrderStatus::Delivered)?;

        let result = sqlx::query(
            r#"
            UPDATE orders SET status = 'delivered', delivered_at = ?1, updated_at = ?1
            WHERE id = ?2 AND status = 'out_for_delivery'
            "#,
        )
        .bind(ts(now))
        .bind(order_id.to_string())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::InvalidTransition(format!(
                "order {} is no longer out for delivery",
                order_id
            )));
        }

        let items = fetch_order_items(&mut tx, order_id).await?;
        let mut payees: Vec<(PayeeKind, Uuid, Decimal)> = cook_totals(&items)?
            .into_iter()
            .map(|(cook_id, amount)| (PayeeKind::Cook, cook_id, amount))
            .collect();
        if let Some(staff_id) = order.delivery_staff_id {
            if order.delivery_charge > Decimal::ZERO {
                payees.push((PayeeKind::Delivery, staff_id, order.delivery_charge));
            }
        }

        let mut created = Vec::with_capacity(payees.len());
        for (payee_kind, payee_id, amount) in payees {
            let settlement = Settlement {
                id: Uuid::new_v4(),
                order_id: *order_id,
                payee_kind,
                payee_id,
                amount,
                status: SettlementStatus::Pending,
                created_at: now,
                approved_at: None,
                approved_by: None,
            };
            let inserted = sqlx::query(
                r#"
                INSERT INTO settlements (id, order_id, payee_kind, payee_id, amount, status, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT (order_id, payee_kind, payee_id) DO NOTHING
                "#,
            )
            .bind(settlement.id.to_string())
            .bind(settlement.order_id.to_string())
            .bind(settlement.payee_kind.as_str())
            .bind(settlement.payee_id.to_string())
            .bind(settlement.amount.to_string())
            .bind(settlement.status.as_str())
            .bind(ts(settlement.created_at))
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if inserted == 1 {
                created.push(settlement);
            }
        }

        tx.commit().await?;
        info!(action = "order_delivered", order_id = %order_id, settlements = created.len());
        Ok(created)
    }

    /// Cancels the order and withdraws any unanswered cook assignments.
    pub async fn cancel_order(&self, order_id: &Uuid, from: &[OrderStatus], now: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        set_status(&mut tx, order_id, from, OrderStatus::Cancelled, now).await?;
        sqlx::query(
            "UPDATE cook_assignments SET status = 'cancelled', responded_at = ?1 WHERE order_id = ?2 AND status = 'pending'",
        )
        .bind(ts(now))
        .bind(order_id.to_string())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    // Settlements and wallet

    pub async fn get_settlement(&self, id: &Uuid) -> Result<Settlement> {
        let row = sqlx::query("SELECT * FROM settlements WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Settlement {} not found", id)))?;
        settlement_from_row(&row)
    }

    pub async fn list_settlements(
        &self,
        status: Option<SettlementStatus>,
        payee: Option<(PayeeKind, Uuid)>,
        order_id: Option<&Uuid>,
    ) -> Result<Vec<Settlement>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM settlements
            WHERE (?1 IS NULL OR status = ?1)
              AND (?2 IS NULL OR payee_kind = ?2)
              AND (?3 IS NULL OR payee_id = ?3)
              AND (?4 IS NULL OR order_id = ?4)
            ORDER BY created_at DESC
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(payee.map(|(kind, _)| kind.as_str()))
        .bind(payee.map(|(_, id)| id.to_string()))
        .bind(order_id.map(|id| id.to_string()))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(settlement_from_row).collect()
    }

    /// Approves every listed settlement and credits the payees' wallets.
    /// All or nothing: one already-approved or unknown id rolls the whole batch back.
    pub async fn approve_settlements(
        &self,
        ids: &[Uuid],
        approved_by: &Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<Settlement>> {
        let mut tx = self.pool.begin().await?;
        let mut approved = Vec::with_capacity(ids.len());

        for id in ids {
            let result = sqlx::query(
                r#"
                UPDATE settlements SET status = 'approved', approved_at = ?1, approved_by = ?2
                WHERE id = ?3 AND status = 'pending'
                "#,
            )
            .bind(ts(now))
            .bind(approved_by.to_string())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

            let row = sqlx::query("SELECT * FROM settlements WHERE id = ?1")
                .bind(id.to_string())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Settlement {} not found", id)))?;
            if result.rows_affected() == 0 {
                return Err(AppError::Conflict(format!("Settlement {} is already approved", id)));
            }
            let settlement = settlement_from_row(&row)?;

            sqlx::query(
                r#"
                INSERT INTO wallet_transactions (id, payee_kind, payee_id, settlement_id, amount, description, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(settlement.payee_kind.as_str())
            .bind(settlement.payee_id.to_string())
            .bind(settlement.id.to_string())
            .bind(settlement.amount.to_string())
            .bind(format!("Settlement for order {}", settlement.order_id))
            .bind(ts(now))
            .execute(&mut *tx)
            .await?;

            approved.push(settlement);
        }

        tx.commit().await?;
        info!(action = "settlements_approved", count = approved.len(), approved_by = %approved_by);
        Ok(approved)
    }

    pub async fn get_wallet_transactions(&self, kind: PayeeKind, payee_id: &Uuid) -> Result<Vec<WalletTransaction>> {
        let rows = sqlx::query(
            "SELECT * FROM wallet_transactions WHERE payee_kind = ?1 AND payee_id = ?2 ORDER BY created_at DESC",
        )
        .bind(kind.as_str())
        .bind(payee_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(wallet_tx_from_row).collect()
    }

    // Notifications

    pub async fn store_notification(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, profile_id, notification_type, title, message, metadata, is_read, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(notification.id.to_string())
        .bind(notification.profile_id.to_string())
        .bind(notification.notification_type.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.metadata.as_ref().map(serde_json::to_string).transpose()?)
        .bind(notification.is_read)
        .bind(ts(notification.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to store notification: {}", e)))?;
        Ok(())
    }

    pub async fn get_profile_notifications(&self, profile_id: &Uuid, limit: Option<i64>) -> Result<Vec<Notification>> {
        let query = format!(
            "SELECT * FROM notifications WHERE profile_id = ?1 ORDER BY created_at DESC {}",
            limit.map(|l| format!("LIMIT {}", l.max(0))).unwrap_or_default()
        );
        let rows = sqlx::query(&query)
            .bind(profile_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(notification_from_row).collect()
    }

    pub async fn mark_notification_read(&self, id: &Uuid, profile_id: &Uuid) -> Result<()> {
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = ?1 AND profile_id = ?2")
            .bind(id.to_string())
            .bind(profile_id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Notification {} not found", id)));
        }
        Ok(())
    }
}

async fn fetch_order_items(conn: &mut SqliteConnection, order_id: &Uuid) -> Result<Vec<OrderItem>> {
    let rows = sqlx::query("SELECT * FROM order_items WHERE order_id = ?1 ORDER BY food_name")
        .bind(order_id.to_string())
        .fetch_all(&mut *conn)
        .await?;
    rows.iter().map(order_item_from_row).collect()
}

async fn set_status(
    conn: &mut SqliteConnection,
    order_id: &Uuid,
    from: &[OrderStatus],
    to: OrderStatus,
    now: DateTime<Utc>,
) -> Result<()> {
    let sql = format!(
        "UPDATE orders SET status = ?, updated_at = ? WHERE id = ? AND status IN ({})",
        placeholders(from.len())
    );
    let mut query = sqlx::query(&sql)
        .bind(to.as_str())
        .bind(ts(now))
        .bind(order_id.to_string());
    for status in from {
        query = query.bind(status.as_str());
    }

    if query.execute(&mut *conn).await?.rows_affected() == 1 {
        return Ok(());
    }

    let current: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = ?")
        .bind(order_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    match current {
        None => Err(AppError::NotFound(format!("Order {} not found", order_id))),
        Some(current) => Err(AppError::InvalidTransition(format!(
            "order {} cannot move from {} to {}",
            order_id, current, to
        ))),
    }
}
