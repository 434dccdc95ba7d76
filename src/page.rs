//! The weekly meal page.
//!
//! Day cards come from [`MealDay`]; the weather widget script is fed the
//! OpenWeather key and coordinates from [`WeatherConfig`].

use askama::Template;

use crate::config::WeatherConfig;
use crate::meal::{MealDay, MealRow};

#[derive(Template)]
#[template(path = "meal.html")]
pub struct MealPageTemplate<'a> {
    pub school_name: &'a str,
    pub days: Vec<MealDay>,
    /// Already a JavaScript string literal, see [`script_string`]
    pub weather_api_key: String,
    pub lat: f64,
    pub lon: f64,
}

/// Render the weekly meal page, one day card per row in API order.
pub fn render_meal_page(
    rows: &[MealRow],
    school_name: &str,
    weather: &WeatherConfig,
) -> Result<String, askama::Error> {
    MealPageTemplate {
        school_name,
        days: rows.iter().map(MealDay::from_row).collect(),
        weather_api_key: script_string(&weather.api_key),
        lat: weather.lat,
        lon: weather.lon,
    }
    .render()
}

/// Quote `value` as a JavaScript string literal that is safe inside `<script>`.
pub fn script_string(value: &str) -> String {
    serde_json::Value::String(value.to_owned())
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}
