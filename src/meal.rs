//! Weekly school meals from the NEIS `mealServiceDietInfo` API.

use std::path::PathBuf;

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use tracing::{info, Instrument};

use crate::config::{MealConfig, WeatherConfig};
use crate::dates::week_range;
use crate::error::{FetchError, MealError};
use crate::fetcher::Fetcher;
use crate::page::render_meal_page;

/// Highest allergen code in the NEIS legend
pub const MAX_ALLERGEN_CODE: u8 = 19;

/// Monday-first, indexed by `Weekday::num_days_from_monday`
const WEEKDAY_LABELS: [&str; 7] = ["월", "화", "수", "목", "금", "토", "일"];

/// Separator NEIS uses between menu lines in `DDISH_NM`
const MENU_SEPARATOR: &str = "<br/>";

/// One school day as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MealRow {
    /// YYYYMMDD
    #[serde(rename = "MLSV_YMD")]
    pub date: String,
    #[serde(rename = "DDISH_NM")]
    pub dish_names: String,
}

#[derive(Debug, Deserialize)]
struct MealResponse {
    #[serde(rename = "mealServiceDietInfo")]
    sections: Option<Vec<MealSection>>,
}

/// Either the `head` block or the `row` block of a response.
#[derive(Debug, Deserialize)]
struct MealSection {
    #[serde(default)]
    row: Vec<MealRow>,
}

/// Fetch the meals served between `from` and `to`, inclusive.
///
/// A response without `mealServiceDietInfo` (NEIS answers "no data" that way)
/// is an empty week, not an error.
pub async fn fetch_meals(
    fetcher: &Fetcher,
    config: &MealConfig,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<MealRow>, FetchError> {
    let url = format!(
        "{}/mealServiceDietInfo",
        config.neis_base_url.trim_end_matches('/')
    );
    let from = from.format("%Y%m%d").to_string();
    let to = to.format("%Y%m%d").to_string();

    let response: MealResponse = fetcher
        .get_json(
            &url,
            &[
                ("KEY", config.api_key.as_str()),
                ("Type", "json"),
                ("ATPT_OFCDC_SC_CODE", config.office_code.as_str()),
                ("SD_SCHUL_CODE", config.school_code.as_str()),
                ("MLSV_FROM_YMD", from.as_str()),
                ("MLSV_TO_YMD", to.as_str()),
            ],
        )
        .await?;

    Ok(response
        .sections
        .unwrap_or_default()
        .into_iter()
        .flat_map(|section| section.row)
        .collect())
}

/// Strip `(n)` allergen markers for n in 1..=19 from a menu line.
///
/// Codes are reported in ascending order, not in the order they appear, and
/// each code once no matter how often it occurs.
pub fn extract_allergens(line: &str) -> (String, Vec<u8>) {
    let mut text = line.to_string();
    let mut codes = Vec::new();

    for code in 1..=MAX_ALLERGEN_CODE {
        let marker = format!("({})", code);
        if text.contains(&marker) {
            text = text.replace(&marker, "");
            codes.push(code);
        }
    }

    (text, codes)
}

/// A day card: label, cleaned menu lines, and the allergens of the whole day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MealDay {
    pub label: String,
    pub menu: Vec<String>,
    pub allergens: Vec<u8>,
}

impl MealDay {
    pub fn from_row(row: &MealRow) -> Self {
        let mut menu = Vec::new();
        let mut allergens = Vec::new();

        for line in row.dish_names.split(MENU_SEPARATOR) {
            let (text, codes) = extract_allergens(line);
            let text = text.trim();
            if !text.is_empty() {
                menu.push(text.to_string());
            }
            allergens.extend(codes);
        }
        allergens.sort_unstable();
        allergens.dedup();

        Self {
            label: day_label(&row.date),
            menu,
            allergens,
        }
    }

    pub fn allergen_text(&self) -> String {
        self.allergens
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// `"07월 14일 (월)"` for `"20250714"`; the raw string if it is not a date.
pub fn day_label(date: &str) -> String {
    match NaiveDate::parse_from_str(date, "%Y%m%d") {
        Ok(day) => format!(
            "{}월 {}일 ({})",
            day.format("%m"),
            day.format("%d"),
            WEEKDAY_LABELS[day.weekday().num_days_from_monday() as usize]
        ),
        Err(_) => date.to_string(),
    }
}

/// Fetch the week shown on `today` and write the meal page.
///
/// Nothing is written when the request fails or the week has no meals.
pub async fn build_meal_page(
    fetcher: &Fetcher,
    meal: &MealConfig,
    weather: &WeatherConfig,
    today: NaiveDate,
) -> Result<PathBuf, MealError> {
    let span = tracing::info_span!("meal", school = %meal.school_name);
    write_week(fetcher, meal, weather, today)
        .instrument(span)
        .await
}

async fn write_week(
    fetcher: &Fetcher,
    meal: &MealConfig,
    weather: &WeatherConfig,
    today: NaiveDate,
) -> Result<PathBuf, MealError> {
    let (monday, friday) = week_range(today);
    info!("Fetching meals for {} ~ {}", monday, friday);

    let rows = fetch_meals(fetcher, meal, monday, friday).await?;
    if rows.is_empty() {
        return Err(MealError::Empty {
            from: monday.to_string(),
            to: friday.to_string(),
        });
    }

    let html = render_meal_page(&rows, &meal.school_name, weather)?;
    std::fs::write(&meal.output, html).map_err(|source| MealError::Write {
        path: meal.output.display().to_string(),
        source,
    })?;

    info!("Wrote {} days to {}", rows.len(), meal.output.display());
    Ok(meal.output.clone())
}
