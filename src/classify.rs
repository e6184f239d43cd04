use crate::models::Category;

/// Keywords that route a query down the weather path.
const WEATHER_KEYWORDS: &[&str] = &[
    "weather",
    "temperature",
    "forecast",
    "climate",
    "wind",
    "humidity",
];

/// Keywords that route a query down the news path. News wins when a query
/// matches both sets.
const NEWS_KEYWORDS: &[&str] = &[
    "news",
    "latest",
    "update",
    "earthquake",
    "flood",
    "cyclone",
    "storm",
    "disaster",
    "tsunami",
    "landslide",
    "wildfire",
    "hurricane",
];

/// Classify free-text user input into the adapter path it should take.
/// Substring matching on the lowercased input; total and deterministic.
pub fn classify(text: &str) -> Category {
    let lower = text.to_lowercase();
    if NEWS_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Category::News
    } else if WEATHER_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Category::Weather
    } else {
        Category::General
    }
}
