//! Daily mass readings: the durable `mass_readings` store and the shapes the
//! calendar generator and the API exchange.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// The four readings of a day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Readings {
    pub first: String,
    pub psalm: String,
    pub second: String,
    pub gospel: String,
}

impl Readings {
    fn cleaned(&self) -> Self {
        Self {
            first: clean_reading_text(&self.first),
            psalm: clean_reading_text(&self.psalm),
            second: clean_reading_text(&self.second),
            gospel: clean_reading_text(&self.gospel),
        }
    }
}

/// Liturgical data for one date, as returned to clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MassReadings {
    pub date: String,
    pub saint: String,
    pub season: String,
    pub season_week: String,
    pub year: String,
    pub readings: Readings,
}

/// Flat form stored in the cache under `mass:{date}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachedMassReadings {
    pub date: String,
    pub saint: String,
    pub season: String,
    pub season_week: String,
    pub year: String,
    pub first: String,
    pub psalm: String,
    pub second: String,
    pub gospel: String,
}

impl From<&MassReadings> for CachedMassReadings {
    fn from(m: &MassReadings) -> Self {
        Self {
            date: m.date.clone(),
            saint: m.saint.clone(),
            season: m.season.clone(),
            season_week: m.season_week.clone(),
            year: m.year.clone(),
            first: m.readings.first.clone(),
            psalm: m.readings.psalm.clone(),
            second: m.readings.second.clone(),
            gospel: m.readings.gospel.clone(),
        }
    }
}

impl CachedMassReadings {
    /// Response form with cleaned reading texts. A blank cached date falls
    /// back to `requested_date`.
    pub fn into_response(self, requested_date: &str) -> MassReadings {
        let date = if self.date.is_empty() {
            requested_date.to_string()
        } else {
            self.date
        };
        MassReadings {
            date,
            saint: self.saint,
            season: self.season,
            season_week: self.season_week,
            year: self.year,
            readings: Readings {
                first: self.first,
                psalm: self.psalm,
                second: self.second,
                gospel: self.gospel,
            }
            .cleaned(),
        }
    }
}

/// Decode HTML entities, normalise U+2010 hyphens and trim.
pub fn clean_reading_text(text: &str) -> String {
    html_escape::decode_html_entities(text)
        .replace('\u{2010}', "-")
        .trim()
        .to_string()
}

/// `season_week` arrives as either a string or a number.
#[derive(Deserialize)]
#[serde(untagged)]
enum WeekField {
    Text(String),
    Number(i64),
}

#[derive(Deserialize)]
struct CalendarPayload {
    #[serde(default)]
    date: String,
    #[serde(default)]
    saint: String,
    #[serde(default)]
    season: String,
    season_week: Option<WeekField>,
    #[serde(default)]
    year: String,
    #[serde(default)]
    readings: Readings,
}

/// Parse the generator's calendar JSON for `date`.
pub fn parse_calendar_payload(raw: &str, date: &str) -> Result<MassReadings> {
    let body = crate::llm::reply::strip_code_fence(raw.trim());
    let payload: CalendarPayload =
        serde_json::from_str(body).context("calendar payload is not valid JSON")?;
    let season_week = match payload.season_week {
        Some(WeekField::Text(s)) => s,
        Some(WeekField::Number(n)) => n.to_string(),
        None => String::new(),
    };
    Ok(MassReadings {
        date: if payload.date.is_empty() {
            date.to_string()
        } else {
            payload.date
        },
        saint: payload.saint,
        season: payload.season,
        season_week,
        year: payload.year,
        readings: payload.readings.cleaned(),
    })
}

pub fn get_mass_reading(conn: &Connection, date: &str) -> Result<Option<MassReadings>> {
    Ok(conn
        .query_row(
            "SELECT date, season, season_week, year, saint, first, psalm, second, gospel \
             FROM mass_readings WHERE date = ?1",
            params![date],
            |row| {
                Ok(MassReadings {
                    date: row.get(0)?,
                    season: row.get(1)?,
                    season_week: row.get(2)?,
                    year: row.get(3)?,
                    saint: row.get(4)?,
                    readings: Readings {
                        first: row.get(5)?,
                        psalm: row.get(6)?,
                        second: row.get(7)?,
                        gospel: row.get(8)?,
                    },
                })
            },
        )
        .optional()?)
}

pub fn save_mass_reading(conn: &Connection, readings: &MassReadings) -> Result<()> {
    conn.execute(
        "INSERT INTO mass_readings (date, season, season_week, year, saint, first, psalm, second, gospel) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
         ON CONFLICT(date) DO UPDATE SET season = excluded.season, season_week = excluded.season_week, \
         year = excluded.year, saint = excluded.saint, first = excluded.first, psalm = excluded.psalm, \
         second = excluded.second, gospel = excluded.gospel",
        params![
            readings.date,
            readings.season,
            readings.season_week,
            readings.year,
            readings.saint,
            readings.readings.first,
            readings.readings.psalm,
            readings.readings.second,
            readings.readings.gospel,
        ],
    )?;
    Ok(())
}
