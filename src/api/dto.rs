use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    sensors::{
        aggregate::Selector, chart::ChartSeries, AlertLevel, Category, SensorRecord, WaterLevel,
    },
    session::{Session, UserProfile},
};

use super::errors::AppError;

/// A sensor plus its freshness at request time.
#[derive(Debug, Serialize, ToSchema)]
pub struct SensorDto {
    #[serde(flatten)]
    pub record: SensorRecord,
    /// Reported within the freshness window.
    pub active: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionDto {
    pub session_id: Uuid,
    pub user: UserProfile,
    /// Records kept after normalisation, duplicates included.
    pub sensor_count: usize,
    pub started_at: DateTime<Utc>,
}

impl From<&Session> for SessionDto {
    fn from(s: &Session) -> Self {
        Self {
            session_id: s.id,
            user: s.user.clone(),
            sensor_count: s.sensors.len(),
            started_at: s.started_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LocationCount {
    pub location: String,
    pub count: usize,
}

/// Response for `GET /sensors/{id}/history`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryResponse {
    pub sensor_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    /// Every report inside the window, oldest first.
    pub readings: Vec<SensorRecord>,
    pub chart: ChartSeries,
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// Selection filters for `GET /sensors`. `all` (or omitting a key) means no
/// filter on that field.
#[derive(Debug, Default, Deserialize)]
pub struct SensorQuery {
    pub category: Option<String>,
    pub location: Option<String>,
    pub alert_level: Option<String>,
    pub water_level: Option<String>,
}

impl SensorQuery {
    pub fn selectors(&self) -> Result<Vec<Selector>, AppError> {
        let given = |v: &Option<String>| v.clone().filter(|s| !s.is_empty() && s != "all");
        let mut selectors = Vec::new();

        if let Some(c) = given(&self.category) {
            let c = c.parse::<Category>().map_err(|e| AppError::bad_param("category", e))?;
            selectors.push(Selector::Category(c));
        }
        if let Some(l) = given(&self.location) {
            selectors.push(Selector::Location(l));
        }
        if let Some(a) = given(&self.alert_level) {
            let a = a.parse::<AlertLevel>().map_err(|e| AppError::bad_param("alert_level", e))?;
            selectors.push(Selector::AlertLevel(a));
        }
        if let Some(w) = given(&self.water_level) {
            let w = w.parse::<WaterLevel>().map_err(|e| AppError::bad_param("water_level", e))?;
            selectors.push(Selector::WaterLevel(w));
        }
        Ok(selectors)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtremeQuery {
    pub field: Option<String>,
    pub order: Option<String>,
}

/// Either a preset `range` or an explicit `from` (and optional `to`).
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub range: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}
