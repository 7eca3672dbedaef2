//! Bucket and object name validation.
//!
//! Both the locking layer's consumers and the persistence layer call
//! through these functions, so naming policy lives in one place.  The
//! rules follow the S3 bucket naming restrictions: 3-63 characters,
//! lowercase letters, digits, hyphens and dots, no leading or trailing
//! hyphen/dot, no consecutive dots, and no IPv4-address form.

use crate::errors::StorageError;

/// Check a bucket name against the S3 naming rules.
pub fn is_valid_bucket_name(bucket: &str) -> bool {
    if bucket.len() < 3 || bucket.len() > 63 {
        return false;
    }
    let bytes = bucket.as_bytes();
    let first = bytes[0];
    let last = bytes[bytes.len() - 1];
    if first == b'-' || first == b'.' || last == b'-' || last == b'.' {
        return false;
    }
    if bucket.contains("..") {
        return false;
    }
    if is_ipv4_address(bucket) {
        return false;
    }
    bucket
        .bytes()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == b'-' || c == b'.')
}

/// True when the name is four dot-separated decimal octets, which S3
/// forbids as a bucket name.
fn is_ipv4_address(name: &str) -> bool {
    let groups: Vec<&str> = name.split('.').collect();
    if groups.len() != 4 {
        return false;
    }
    groups
        .iter()
        .all(|g| !g.is_empty() && g.len() <= 3 && g.bytes().all(|c| c.is_ascii_digit()))
}

/// Validate a bucket name, rejecting invalid names before they can reach
/// the lock map or persistence.
pub fn validate_bucket_name(bucket: &str) -> Result<(), StorageError> {
    if is_valid_bucket_name(bucket) {
        Ok(())
    } else {
        Err(StorageError::BucketNameInvalid {
            bucket: bucket.to_string(),
        })
    }
}

/// Validate an object name within `bucket`.  Object names are arbitrary
/// non-empty UTF-8; forward slashes are permitted and significant.
pub fn validate_object_name(bucket: &str, object: &str) -> Result<(), StorageError> {
    if object.is_empty() {
        return Err(StorageError::ObjectNameInvalid {
            bucket: bucket.to_string(),
            object: object.to_string(),
        });
    }
    Ok(())
}

// -- Unit tests ---------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_bucket_names() {
        for name in [
            "minio-bucket",
            "minio-2-bucket",
            "abc",
            "my.bucket.name",
            "a1b2c3",
            "bucket-123",
        ] {
            assert!(is_valid_bucket_name(name), "expected valid: {name}");
        }
    }

    #[test]
    fn test_invalid_bucket_names() {
        let too_long = "x".repeat(64);
        for name in [
            "",
            "a",
            "ad",
            ".test",
            "------",
            "$this-is-not-valid-too",
            "Test",
            "a..b",
            "trailing-",
            "trailing.",
            "UPPERCASE",
            "has space",
            "has_underscore",
            too_long.as_str(),
        ] {
            assert!(!is_valid_bucket_name(name), "expected invalid: {name}");
        }
    }

    #[test]
    fn test_ip_address_form_rejected() {
        assert!(!is_valid_bucket_name("192.168.1.1"));
        assert!(!is_valid_bucket_name("10.0.0.1"));
        // Dotted names that are not pure numeric octets stay valid.
        assert!(is_valid_bucket_name("192.168.1.x"));
        assert!(is_valid_bucket_name("1.2.3.4.5"));
    }

    #[test]
    fn test_validate_bucket_name_message() {
        let err = validate_bucket_name(".test").unwrap_err();
        assert_eq!(err.to_string(), "Bucket name invalid: .test");
    }

    #[test]
    fn test_validate_object_name() {
        assert!(validate_object_name("minio-bucket", "minio-object").is_ok());
        assert!(validate_object_name("minio-bucket", "dir/sub/object").is_ok());

        let err = validate_object_name("minio-bucket", "").unwrap_err();
        assert_eq!(err.to_string(), "Object name invalid: minio-bucket#");
    }
}
