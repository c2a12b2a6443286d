#![allow(dead_code)]

use genrepo_core::{FieldError, Record, RecordMeta};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub meta: RecordMeta<i64>,
    pub name: String,
    pub email: String,
    pub rank: u32,
}

impl Record for Customer {
    type Id = i64;
    const TYPE_NAME: &'static str = "customer";

    fn meta(&self) -> &RecordMeta<i64> {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta<i64> {
        &mut self.meta
    }

    fn relations() -> &'static [&'static str] {
        &["Orders"]
    }

    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "Name is required."));
        }
        if !self.email.contains('@') {
            errors.push(FieldError::new("email", "Email is invalid."));
        }
        errors
    }
}

pub fn customer(name: &str, rank: u32) -> Customer {
    Customer {
        meta: RecordMeta::new(),
        name: name.to_string(),
        email: format!("{}@example.com", name.to_ascii_lowercase()),
        rank,
    }
}

pub fn names(rows: &[Customer]) -> Vec<&str> {
    rows.iter().map(|row| row.name.as_str()).collect()
}
