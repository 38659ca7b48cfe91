use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Replaces the second half of `value` with `*` so ids can be logged.
pub fn mask_half(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let visible = chars.len() / 2;
    chars
        .iter()
        .enumerate()
        .map(|(i, c)| if i < visible { *c } else { '*' })
        .collect()
}

pub fn mask_id(id: i64) -> String {
    mask_half(&id.to_string())
}

/// Whole calendar days between the two instants' UTC dates.
pub fn days_until(now: DateTime<Utc>, target: DateTime<Utc>) -> i64 {
    (target.date_naive() - now.date_naive()).num_days()
}

/// Splits callback data of the form `action?key=value&...`.
pub fn parse_callback_data(data: &str) -> (&str, HashMap<String, String>) {
    match data.split_once('?') {
        Some((action, query)) => {
            let params = url::form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            (action, params)
        }
        None => (data, HashMap::new()),
    }
}

pub fn callback_data(action: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return action.to_string();
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish();
    format!("{}?{}", action, query)
}
