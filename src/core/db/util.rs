use crate::error::{Error, Result};
use crate::models::ObjectCount;

/// Width of the `object_class` column in the relational stores.
pub const MAX_CLASS_LEN: usize = 50;

const MAX_IDENTIFIER_LEN: usize = 64;

pub fn validate_object_class(object_class: &str) -> Result<()> {
    if object_class.trim().is_empty() {
        return Err(Error::Validation("object class must not be empty".to_string()));
    }
    if object_class.chars().count() > MAX_CLASS_LEN {
        return Err(Error::Validation(format!(
            "object class {:?} is longer than {} characters",
            object_class, MAX_CLASS_LEN
        )));
    }
    Ok(())
}

/// Reject a whole batch before any of it is written.
pub fn validate_deltas(deltas: &[ObjectCount]) -> Result<()> {
    for delta in deltas {
        validate_object_class(&delta.object_class)?;
        i64::try_from(delta.count).map_err(|_| {
            Error::Validation(format!(
                "count {} for {:?} does not fit a signed 64-bit column",
                delta.count, delta.object_class
            ))
        })?;
    }
    Ok(())
}

/// Table and database names cannot be bound as statement parameters, so they
/// are restricted to plain identifiers before being spliced into SQL.
pub fn validate_identifier(name: &str) -> Result<&str> {
    let valid = !name.is_empty()
        && name.len() <= MAX_IDENTIFIER_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(name)
    } else {
        Err(Error::Validation(format!(
            "{:?} is not a valid table or database name",
            name
        )))
    }
}

/// Sort totals by class name and keep only the requested classes.
/// Requested classes without a record are left out.
pub fn select_classes(
    mut totals: Vec<ObjectCount>,
    object_classes: Option<&[String]>,
) -> Vec<ObjectCount> {
    if let Some(classes) = object_classes {
        totals.retain(|total| classes.contains(&total.object_class));
    }
    totals.sort_by(|a, b| a.object_class.cmp(&b.object_class));
    totals
}

/// `?, ?, ?` for an `IN (...)` clause with `n` bound values.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_class_limits() {
        assert!(validate_object_class("cat").is_ok());
        assert!(validate_object_class("").is_err());
        assert!(validate_object_class("   ").is_err());
        assert!(validate_object_class(&"x".repeat(MAX_CLASS_LEN)).is_ok());
        assert!(validate_object_class(&"x".repeat(MAX_CLASS_LEN + 1)).is_err());
        // quotes are data, not syntax
        assert!(validate_object_class("cat'); DROP TABLE counter; --").is_ok());
    }

    #[test]
    fn test_deltas_rejected_as_a_batch() {
        let deltas = vec![ObjectCount::new("cat", 1), ObjectCount::new("", 2)];
        assert!(matches!(validate_deltas(&deltas), Err(Error::Validation(_))));

        let huge = vec![ObjectCount::new("cat", u64::MAX)];
        assert!(matches!(validate_deltas(&huge), Err(Error::Validation(_))));
    }

    #[test]
    fn test_identifiers() {
        assert_eq!(validate_identifier("counter").unwrap(), "counter");
        assert!(validate_identifier("prod_counter_2").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("2fast").is_err());
        assert!(validate_identifier("counter; DROP").is_err());
        assert!(validate_identifier("a`b").is_err());
        assert!(validate_identifier(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_select_classes_omits_unknown() {
        let totals = vec![
            ObjectCount::new("dog", 2),
            ObjectCount::new("cat", 1),
            ObjectCount::new("bird", 7),
        ];
        let wanted = vec!["cat".to_string(), "dog".to_string(), "fish".to_string()];
        assert_eq!(
            select_classes(totals.clone(), Some(wanted.as_slice())),
            vec![ObjectCount::new("cat", 1), ObjectCount::new("dog", 2)]
        );
        assert!(select_classes(totals.clone(), Some(&[][..])).is_empty());
        assert_eq!(select_classes(totals, None).len(), 3);
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
