use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use crate::portal::{CHECKSUM_FIELD, INSTANCE_FIELD, SUBMISSION_FIELD};
use crate::utils::error::ExtractError;

static AJAX_IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""ajaxIdentifier":"([A-Za-z0-9]+)""#).expect("Invalid ajax identifier regex")
});

/// Hidden values the login page must be submitted back with. They change on
/// every page load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    pub instance_id: String,
    pub submission_id: String,
    pub checksum: String,
}

impl LoginForm {
    pub fn from_html(body: &str) -> Result<Self, ExtractError> {
        if body.trim().is_empty() {
            return Err(ExtractError::EmptyBody { page: "login page" });
        }

        let document = Html::parse_document(body);
        Ok(Self {
            instance_id: hidden_value(&document, INSTANCE_FIELD)?,
            submission_id: hidden_value(&document, SUBMISSION_FIELD)?,
            checksum: hidden_value(&document, CHECKSUM_FIELD)?,
        })
    }

    pub fn numeric_instance(&self) -> Result<i64, ExtractError> {
        self.instance_id
            .trim()
            .parse()
            .map_err(|_| ExtractError::NonNumericInstance(self.instance_id.clone()))
    }
}

fn hidden_value(document: &Html, field: &'static str) -> Result<String, ExtractError> {
    let selector = Selector::parse(&format!("input#{}", field))
        .map_err(|_| ExtractError::MissingField { field })?;

    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr("value"))
        .map(str::to_string)
        .ok_or(ExtractError::MissingField { field })
}

/// Pull the single `name=value` pair out of the login response's Set-Cookie headers.
pub fn parse_session_cookie(headers: &[String]) -> Result<(String, String), ExtractError> {
    let header = match headers {
        [] => return Err(ExtractError::MissingCookie),
        [header] => header,
        _ => {
            return Err(ExtractError::MalformedCookie(format!(
                "expected one cookie, got {}",
                headers.len()
            )))
        }
    };

    let pair = header.split(';').next().unwrap_or_default().trim();
    let parts: Vec<&str> = pair.split('=').collect();
    match parts.as_slice() {
        [name, value] if !name.trim().is_empty() && !value.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        // Only the cookie name is safe to echo back.
        _ => Err(ExtractError::MalformedCookie(
            parts.first().map(|name| name.trim().to_string()).unwrap_or_default(),
        )),
    }
}

pub fn extract_ajax_token(body: &str) -> Result<String, ExtractError> {
    if body.trim().is_empty() {
        return Err(ExtractError::EmptyBody { page: "landing page" });
    }

    AJAX_IDENTIFIER
        .captures(body)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or(ExtractError::MissingAjaxToken)
}
