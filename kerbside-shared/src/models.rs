use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Facility category, closed set
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FacilityCategory {
    Mall,
    Hospital,
    Park,
    Other,
}

impl FacilityCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacilityCategory::Mall => "MALL",
            FacilityCategory::Hospital => "HOSPITAL",
            FacilityCategory::Park => "PARK",
            FacilityCategory::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MALL" => Some(FacilityCategory::Mall),
            "HOSPITAL" => Some(FacilityCategory::Hospital),
            "PARK" => Some(FacilityCategory::Park),
            "OTHER" => Some(FacilityCategory::Other),
            _ => None,
        }
    }
}

/// A parking location with a fixed spot capacity and an hourly rate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Facility {
    pub id: Uuid,
    pub name: String,
    pub category: FacilityCategory,
    pub address: String,
    pub total_spots: i32,
    pub hourly_rate: f64,
    pub latitude: f64,
    pub longitude: f64,
}

impl Facility {
    pub fn new(
        name: String,
        category: FacilityCategory,
        address: String,
        total_spots: i32,
        hourly_rate: f64,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            category,
            address,
            total_spots,
            hourly_rate,
            latitude,
            longitude,
        }
    }
}

/// Live available-spot count for a facility (1:1 with Facility).
///
/// `version` is a local monotonic counter used for compare-and-swap writes;
/// it never travels on the remote feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupancyStatus {
    pub facility_id: Uuid,
    pub available_spots: i32,
    pub last_updated: DateTime<Utc>,
    #[serde(skip)]
    pub version: i64,
}

impl OccupancyStatus {
    pub fn new(facility_id: Uuid, available_spots: i32) -> Self {
        Self {
            facility_id,
            available_spots,
            last_updated: Utc::now(),
            version: 0,
        }
    }
}

/// Payment lifecycle of a session or an individual payment record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(PaymentStatus::Pending),
            "COMPLETED" => Some(PaymentStatus::Completed),
            "FAILED" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }
}

/// One user's continuous parking interval from entry to exit.
///
/// `exit_time` absent means the session is active. Sessions are mutated on
/// end, coupon application and payment status change, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub facility_id: Uuid,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub payment_status: PaymentStatus,
    pub applied_coupon_id: Option<Uuid>,
    /// Advisory free-text label, not an enforced exclusive resource
    pub spot_label: Option<String>,
}

impl Session {
    pub fn start(user_id: Uuid, facility_id: Uuid, spot_label: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            facility_id,
            entry_time: Utc::now(),
            exit_time: None,
            payment_status: PaymentStatus::Pending,
            applied_coupon_id: None,
            spot_label,
        }
    }

    pub fn is_active(&self) -> bool {
        self.exit_time.is_none()
    }
}

/// Payment network, closed set
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Mpesa,
    Paypal,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Mpesa => "MPESA",
            PaymentMethod::Paypal => "PAYPAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MPESA" => Some(PaymentMethod::Mpesa),
            "PAYPAL" => Some(PaymentMethod::Paypal),
            _ => None,
        }
    }
}

/// A recorded payment attempt. Immutable once created; a failed attempt is a
/// new record, not a mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub session_id: Uuid,
    pub amount: f64,
    pub method: PaymentMethod,
    pub transaction_ref: String,
    pub timestamp: DateTime<Utc>,
    pub status: PaymentStatus,
}

impl Payment {
    pub fn completed(
        session_id: Uuid,
        amount: f64,
        method: PaymentMethod,
        transaction_ref: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            amount,
            method,
            transaction_ref,
            timestamp: Utc::now(),
            status: PaymentStatus::Completed,
        }
    }
}

/// Percentage discount code with an expiry and an optional facility
/// restriction (`facility_id` absent means valid everywhere)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub discount_percentage: i32,
    pub expires_at: DateTime<Utc>,
    pub facility_id: Option<Uuid>,
}

impl Coupon {
    pub fn new(
        code: String,
        discount_percentage: i32,
        expires_at: DateTime<Utc>,
        facility_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            code,
            discount_percentage,
            expires_at,
            facility_id,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Account identity as supplied by the identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// A payment method saved against a user; at most one is the default
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedPaymentMethod {
    pub id: Uuid,
    pub user_id: Uuid,
    pub method: PaymentMethod,
    pub is_default: bool,
    pub last_four: Option<String>,
    pub nickname: Option<String>,
}
