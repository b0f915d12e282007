// Input rules for wish fields, applied before anything reaches the store
use serde::Deserialize;
use thiserror::Error;

use crate::db::models::Wish;

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_NOTES_LEN: usize = 2000;
pub const MAX_URL_LEN: usize = 2048;

#[derive(Debug, Error, PartialEq)]
#[error("{0}")]
pub struct ValidationError(pub String);

fn invalid(msg: impl Into<String>) -> ValidationError {
    ValidationError(msg.into())
}

/// The caller-editable part of a wish.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct WishFields {
    pub name: Option<String>,
    pub url: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub notes: Option<String>,
    pub is_fulfilled: bool,
    pub category_ids: Vec<String>,
}

impl WishFields {
    /// Trim and check every field. A price needs a currency; a currency
    /// without a price is dropped.
    pub fn validate(mut self, require_categories: bool) -> Result<Self, ValidationError> {
        self.name = non_blank(self.name);
        self.notes = non_blank(self.notes);
        self.url = non_blank(self.url);
        self.currency = non_blank(self.currency).map(|c| c.to_ascii_uppercase());

        if let Some(name) = &self.name {
            if name.chars().count() > MAX_NAME_LEN {
                return Err(invalid(format!(
                    "name must be {} characters or less",
                    MAX_NAME_LEN
                )));
            }
        }

        if let Some(notes) = &self.notes {
            if notes.chars().count() > MAX_NOTES_LEN {
                return Err(invalid(format!(
                    "notes must be {} characters or less",
                    MAX_NOTES_LEN
                )));
            }
        }

        if let Some(raw) = &self.url {
            validate_url(raw)?;
        }

        match self.price {
            Some(price) if !price.is_finite() || price < 0.0 => {
                return Err(invalid("price must be a non-negative number"));
            }
            Some(_) => match &self.currency {
                None => return Err(invalid("currency is required when price is set")),
                Some(c) if c.len() != 3 || !c.chars().all(|ch| ch.is_ascii_alphabetic()) => {
                    return Err(invalid("currency must be a three-letter code"));
                }
                Some(_) => {}
            },
            None => self.currency = None,
        }

        self.category_ids.retain(|id| !id.trim().is_empty());
        self.category_ids.sort();
        self.category_ids.dedup();
        if require_categories && self.category_ids.is_empty() {
            return Err(invalid("at least one category is required"));
        }

        Ok(self)
    }

    /// Copy the mutable fields onto a wish, leaving identity, ownership,
    /// publication and provenance untouched.
    pub fn apply_to(&self, wish: &mut Wish) {
        wish.name = self.name.clone();
        wish.url = self.url.clone();
        wish.price = self.price;
        wish.currency = self.currency.clone();
        wish.notes = self.notes.clone();
        wish.is_fulfilled = self.is_fulfilled;
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn validate_url(raw: &str) -> Result<url::Url, ValidationError> {
    if raw.len() > MAX_URL_LEN {
        return Err(invalid(format!(
            "url must be {} characters or less",
            MAX_URL_LEN
        )));
    }
    let parsed = url::Url::parse(raw).map_err(|_| invalid("url is malformed"))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        _ => Err(invalid("url must be an http(s) address")),
    }
}
