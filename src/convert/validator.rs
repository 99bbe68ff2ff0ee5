//! Per-field validation rules applied to converted `int`, `char` and
//! `foreignkey` values.
//!
//! A [`Validator`] carries state across rows (seen values for `unique`, the
//! previous value for `sorted`/`sequential`), so a fresh one is built for every
//! conversion pass.

use crate::error::ConvertError;
use crate::schema::ValidateSpec;
use anyhow::Result;
use std::collections::HashSet;

#[derive(Debug)]
pub struct Validator<'a> {
    spec: &'a ValidateSpec,
    seen_ints: HashSet<i64>,
    seen_strs: HashSet<String>,
    prev_int: Option<i64>,
    prev_str: Option<String>,
}

fn fail(message: String) -> anyhow::Error {
    ConvertError::data(message).into()
}

impl<'a> Validator<'a> {
    #[must_use]
    pub fn new(spec: &'a ValidateSpec) -> Self {
        Self {
            spec,
            seen_ints: HashSet::new(),
            seen_strs: HashSet::new(),
            prev_int: None,
            prev_str: None,
        }
    }

    /// # Errors
    /// Fails on the first violated rule.
    pub fn check_int(&mut self, value: i64) -> Result<()> {
        let spec = self.spec;
        if spec.unique && !self.seen_ints.insert(value) {
            return Err(fail(format!("unique validation error. value={value}")));
        }
        if spec.anyof.is_some() && !spec.anyof_ints.contains(&value) {
            return Err(fail(format!("anyof validation error. value={value}")));
        }
        if let Some(min) = spec.min
            && value < min
        {
            return Err(fail(format!("min={min} validation error. value={value}")));
        }
        if let Some(max) = spec.max
            && max < value
        {
            return Err(fail(format!("max={max} validation error. value={value}")));
        }
        if let Some(prev) = self.prev_int {
            if spec.sorted && prev > value {
                return Err(fail(format!("sorted value validation error. value={value}")));
            }
            if spec.sequential && prev != value && prev.checked_add(1) != Some(value) {
                return Err(fail(format!("sequential value validation error. value={value}")));
            }
        }
        if spec.sorted || spec.sequential {
            self.prev_int = Some(value);
        }
        Ok(())
    }

    /// # Errors
    /// Fails on the first violated rule; `min`, `max` and `sequential` never
    /// apply to strings.
    pub fn check_str(&mut self, value: &str) -> Result<()> {
        let spec = self.spec;
        if spec.unique && !self.seen_strs.insert(value.to_string()) {
            return Err(fail(format!("unique validation error. value={value}")));
        }
        if let Some(anyof) = &spec.anyof
            && !anyof.contains(value)
        {
            return Err(fail(format!("anyof validation error. value={value}")));
        }
        if spec.min.is_some() {
            return Err(fail(format!("min validation requires int type. value={value}")));
        }
        if spec.max.is_some() {
            return Err(fail(format!("max validation requires int type. value={value}")));
        }
        if spec.sequential {
            return Err(fail(format!(
                "sequential validation requires int type. value={value}"
            )));
        }
        if spec.sorted {
            if let Some(prev) = &self.prev_str
                && prev.as_str() > value
            {
                return Err(fail(format!("sorted value validation error. value={value}")));
            }
            self.prev_str = Some(value.to_string());
        }
        Ok(())
    }
}
