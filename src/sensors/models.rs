use std::{fmt, str::FromStr};

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;

/// Placeholder the upstream feed uses for "no reading". Matched case-insensitively.
pub const EMPTY_SENTINEL: &str = "empty";

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// Kind of installation a sensor is mounted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Enclosure,
    Incubator,
    /// Missing or unrecognised upstream tag.
    Unknown,
}

impl Category {
    /// Map an upstream tag onto a category. Anything unrecognised is `Unknown`.
    pub fn from_wire(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("baia" | "enclosure") => Self::Enclosure,
            Some("incubadora" | "incubator") => Self::Incubator,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enclosure => "enclosure",
            Self::Incubator => "incubator",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "enclosure" => Ok(Self::Enclosure),
            "incubator" => Ok(Self::Incubator),
            "unknown" => Ok(Self::Unknown),
            other => Err(anyhow!("unknown category: {other:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// WaterLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WaterLevel {
    Ok,
    Low,
}

impl WaterLevel {
    /// Upstream encodes a full tank as `"0"` and a low one as `"1"`.
    pub fn from_wire(raw: Option<&str>) -> Option<Self> {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("0" | "ok" | "full") => Some(Self::Ok),
            Some("1" | "low") => Some(Self::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for WaterLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WaterLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "ok" => Ok(Self::Ok),
            "low" => Ok(Self::Low),
            other => Err(anyhow!("unknown water level: {other:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// AlertLevel
// ---------------------------------------------------------------------------

/// Alert severity, ordered from quietest to loudest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    #[default]
    None,
    Info,
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn from_wire(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("info") => Self::Info,
            Some("warning") => Self::Warning,
            Some("critical") => Self::Critical,
            _ => Self::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "critical" => Ok(Self::Critical),
            other => Err(anyhow!("unknown alert level: {other:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// SensorRecord
// ---------------------------------------------------------------------------

/// One reporting unit's latest known telemetry, normalised.
///
/// Every optional field is `None` when upstream sent nothing, `null`, the
/// `"empty"` sentinel, or a value that does not parse. A missing reading is
/// never represented as zero.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SensorRecord {
    pub id: String,
    pub category: Category,
    pub location: Option<String>,
    /// °C
    pub temperature: Option<f64>,
    pub water_level: Option<WaterLevel>,
    /// %
    pub humidity: Option<f64>,
    /// hPa
    pub pressure: Option<f64>,
    /// ppm
    pub ammonia: Option<f64>,
    pub alert_level: AlertLevel,
    pub message: Option<String>,
    pub activation_count: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Numeric reading that can be ranked with `aggregate::extreme_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NumericField {
    Temperature,
    Humidity,
    Pressure,
    Ammonia,
    ActivationCount,
}

impl NumericField {
    pub fn value(&self, record: &SensorRecord) -> Option<f64> {
        match self {
            Self::Temperature => record.temperature,
            Self::Humidity => record.humidity,
            Self::Pressure => record.pressure,
            Self::Ammonia => record.ammonia,
            Self::ActivationCount => record.activation_count.map(|c| c as f64),
        }
    }
}

impl FromStr for NumericField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "temperature" => Ok(Self::Temperature),
            "humidity" => Ok(Self::Humidity),
            "pressure" => Ok(Self::Pressure),
            "ammonia" => Ok(Self::Ammonia),
            "activation_count" => Ok(Self::ActivationCount),
            other => Err(anyhow!("unknown numeric field: {other:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
//
// The upstream login response delivers sensors as loosely typed JSON: numbers
// arrive as strings ("18.5"), absent readings as the literal "empty", and the
// same field may be a number on one record and a string on the next. Raw
// records are deserialised into `WireValue`s and converted to `SensorRecord`
// via TryFrom, so the sentinel never travels past this module.
// ---------------------------------------------------------------------------

/// A single loosely typed field value.
///
/// `Other` catches booleans, objects and arrays so one odd field does not
/// fail the whole record. Order matters: serde tries variants top to bottom.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum WireValue {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl WireValue {
    /// Finite number, parsed from text if needed. Sentinels and junk are `None`.
    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) if !is_sentinel(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        n.filter(|n| n.is_finite())
    }

    /// Non-blank text. Numbers are rendered so `0` and `"0"` read the same.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Text(s) if !is_sentinel(s) => Some(s.trim().to_owned()),
            Self::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// RFC 3339 text or epoch milliseconds.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            Self::Number(n) if n.is_finite() => DateTime::from_timestamp_millis(*n as i64),
            _ => None,
        }
    }
}

/// `true` for the `"empty"` placeholder and for blank strings.
pub fn is_sentinel(s: &str) -> bool {
    let s = s.trim();
    s.is_empty() || s.eq_ignore_ascii_case(EMPTY_SENTINEL)
}

/// A sensor record exactly as the upstream feed sends it.
///
/// Field names follow the upstream feed; the snake_case names produced by
/// serialising a `SensorRecord` are accepted as aliases, so persisted
/// snapshots read back through the same path.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSensorRecord {
    #[serde(default, alias = "id")]
    pub id_sensor: Option<WireValue>,
    #[serde(default, alias = "category")]
    pub sensor_type: Option<WireValue>,
    #[serde(default)]
    pub location: Option<WireValue>,
    #[serde(default, alias = "temperature")]
    pub temp: Option<WireValue>,
    #[serde(default, alias = "water_level")]
    pub level: Option<WireValue>,
    #[serde(default)]
    pub humidity: Option<WireValue>,
    #[serde(default)]
    pub pressure: Option<WireValue>,
    #[serde(default, alias = "ammonia")]
    pub amony: Option<WireValue>,
    #[serde(default, alias = "alert_level")]
    pub status: Option<WireValue>,
    #[serde(default)]
    pub message: Option<WireValue>,
    #[serde(default, alias = "activation_count")]
    pub activations: Option<WireValue>,
    #[serde(default, rename = "createdAt", alias = "created_at")]
    pub created_at: Option<WireValue>,
    #[serde(default, rename = "updatedAt", alias = "updated_at")]
    pub updated_at: Option<WireValue>,
}

impl TryFrom<RawSensorRecord> for SensorRecord {
    type Error = anyhow::Error;

    fn try_from(raw: RawSensorRecord) -> anyhow::Result<Self> {
        let text = |v: &Option<WireValue>| v.as_ref().and_then(WireValue::as_text);
        let number = |v: &Option<WireValue>| v.as_ref().and_then(WireValue::as_number);

        let id = text(&raw.id_sensor).context("sensor record: missing 'id_sensor'")?;

        let updated_at = raw
            .updated_at
            .as_ref()
            .and_then(WireValue::as_timestamp)
            .with_context(|| format!("sensor record {id:?}: missing or invalid 'updatedAt'"))?;

        Ok(Self {
            category: Category::from_wire(text(&raw.sensor_type).as_deref()),
            location: text(&raw.location),
            temperature: number(&raw.temp),
            water_level: WaterLevel::from_wire(text(&raw.level).as_deref()),
            humidity: number(&raw.humidity),
            pressure: number(&raw.pressure),
            ammonia: number(&raw.amony),
            alert_level: AlertLevel::from_wire(text(&raw.status).as_deref()),
            message: text(&raw.message),
            activation_count: number(&raw.activations)
                .filter(|n| *n >= 0.0 && n.fract() == 0.0)
                .map(|n| n as u64),
            created_at: raw.created_at.as_ref().and_then(WireValue::as_timestamp),
            updated_at,
            id,
        })
    }
}

/// Upstream sometimes sends a single sensor object where a list is expected.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SensorFeed {
    Many(Vec<RawSensorRecord>),
    One(Box<RawSensorRecord>),
}

impl SensorFeed {
    pub fn into_vec(self) -> Vec<RawSensorRecord> {
        match self {
            Self::Many(v) => v,
            Self::One(r) => vec![*r],
        }
    }
}

impl Default for SensorFeed {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

/// Normalise a raw feed, dropping (and logging) records that cannot be
/// identified or dated. Arrival order is preserved.
pub fn normalize_feed(raw: Vec<RawSensorRecord>) -> Vec<SensorRecord> {
    let total = raw.len();
    let records: Vec<SensorRecord> = raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, r)| match SensorRecord::try_from(r) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(index, error = %e, "Dropping malformed sensor record");
                None
            }
        })
        .collect();

    if records.len() < total {
        warn!(kept = records.len(), total, "Sensor feed contained malformed records");
    }
    records
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
