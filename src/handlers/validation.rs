use regex::Regex;
use std::sync::LazyLock;

use crate::errors::ApiError;

static TOKEN_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{0,127}$").expect("valid token id pattern"));

const MAX_DAYS: u32 = 3650;

/// Trimmed token id, `None` when blank. Rejects anything that is not a plain
/// lowercase upstream id so query strings never reach cache keys or URLs raw.
pub fn token_id(raw: Option<&str>) -> Result<Option<String>, ApiError> {
    let Some(token) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };

    if !TOKEN_ID.is_match(token) {
        return Err(ApiError::BadRequest(format!("Invalid token id: {}", token)));
    }

    Ok(Some(token.to_string()))
}

/// Day window for OHLC queries: `1..=3650` or `max`
pub fn days(raw: Option<&str>) -> Result<Option<String>, ApiError> {
    let Some(days) = raw.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };

    if days == "max" {
        return Ok(Some(days.to_string()));
    }

    match days.parse::<u32>() {
        Ok(n) if (1..=MAX_DAYS).contains(&n) => Ok(Some(n.to_string())),
        _ => Err(ApiError::BadRequest(format!("Invalid days value: {}", days))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_id_accepts_upstream_ids() {
        assert_eq!(token_id(Some("ethereum")).unwrap(), Some("ethereum".to_string()));
        assert_eq!(token_id(Some(" aver-ai ")).unwrap(), Some("aver-ai".to_string()));
        assert_eq!(token_id(Some("")).unwrap(), None);
        assert_eq!(token_id(None).unwrap(), None);
    }

    #[test]
    fn test_token_id_rejects_injection() {
        assert!(token_id(Some("' OR '1'='1")).is_err());
        assert!(token_id(Some(r#"{"$ne":null}"#)).is_err());
        assert!(token_id(Some("../coins/list")).is_err());
        assert!(token_id(Some("Ethereum")).is_err());
        assert!(token_id(Some("a".repeat(129).as_str())).is_err());
    }

    #[test]
    fn test_days() {
        assert_eq!(days(Some("7")).unwrap(), Some("7".to_string()));
        assert_eq!(days(Some("007")).unwrap(), Some("7".to_string()));
        assert_eq!(days(Some("max")).unwrap(), Some("max".to_string()));
        assert_eq!(days(None).unwrap(), None);
        assert!(days(Some("0")).is_err());
        assert!(days(Some("-1")).is_err());
        assert!(days(Some("9999")).is_err());
        assert!(days(Some("7; drop")).is_err());
    }
}
