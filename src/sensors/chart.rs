use std::{fmt, str::FromStr};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{
    aggregate::{self, Selector},
    models::{NumericField, SensorRecord, WaterLevel},
    window::TimeWindow,
};

/// How many characters of a sensor id are shown on a chart axis.
const SHORT_ID_LEN: usize = 6;

/// Dashboard charts that can be fed from a sensor snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    CategoryDistribution,
    WaterLevelDistribution,
    RecentTemperature,
}

impl ChartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CategoryDistribution => "category_distribution",
            Self::WaterLevelDistribution => "water_level_distribution",
            Self::RecentTemperature => "recent_temperature",
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "category_distribution" => Ok(Self::CategoryDistribution),
            "water_level_distribution" => Ok(Self::WaterLevelDistribution),
            "recent_temperature" => Ok(Self::RecentTemperature),
            other => Err(anyhow!("unknown chart kind: {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ChartPoint {
    pub label: String,
    /// `null` when the sensor has no reading; the chart leaves a gap.
    pub value: Option<f64>,
}

impl ChartPoint {
    fn count(label: impl Into<String>, n: usize) -> Self {
        Self {
            label: label.into(),
            value: Some(n as f64),
        }
    }
}

/// Label/value pairs ready for a chart. No styling, no rendering.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ChartSeries {
    pub title: String,
    pub points: Vec<ChartPoint>,
}

impl ChartSeries {
    fn new(title: &str, points: Vec<ChartPoint>) -> Self {
        Self {
            title: title.to_owned(),
            points,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Build the series for `kind`. `recent_limit` caps the recent-temperature
/// chart. An empty snapshot always yields an empty series.
pub fn bucket_for_chart(records: &[SensorRecord], kind: ChartKind, recent_limit: usize) -> ChartSeries {
    match kind {
        ChartKind::CategoryDistribution => {
            let points = aggregate::group_by_category(records)
                .into_iter()
                .map(|(category, n)| ChartPoint::count(category.as_str(), n))
                .collect();
            ChartSeries::new("Sensors by category", points)
        }

        ChartKind::WaterLevelDistribution => {
            let points = if records.is_empty() {
                vec![]
            } else {
                [WaterLevel::Ok, WaterLevel::Low]
                    .into_iter()
                    .map(|level| {
                        let n = aggregate::filter(records, &Selector::WaterLevel(level)).len();
                        ChartPoint::count(level.as_str(), n)
                    })
                    .collect()
            };
            ChartSeries::new("Water level", points)
        }

        ChartKind::RecentTemperature => {
            let points = aggregate::most_recent(records, recent_limit)
                .iter()
                .map(|r| ChartPoint {
                    label: short_id(&r.id),
                    value: NumericField::Temperature.value(r),
                })
                .collect();
            ChartSeries::new("Recent temperature (°C)", points)
        }
    }
}

/// Temperature over time for one sensor, labelled `HH:MM` from each report's
/// creation time (update time when the report carries none).
pub fn temperature_history(records: &[SensorRecord], id: &str, window: &TimeWindow) -> ChartSeries {
    let points = aggregate::history(records, id, window)
        .iter()
        .map(|r| ChartPoint {
            label: r.created_at.unwrap_or(r.updated_at).format("%H:%M").to_string(),
            value: r.temperature,
        })
        .collect();
    ChartSeries::new("Temperature (°C)", points)
}

/// First few characters of an id followed by an ellipsis.
pub fn short_id(id: &str) -> String {
    let head: String = id.chars().take(SHORT_ID_LEN).collect();
    format!("{head}...")
}
