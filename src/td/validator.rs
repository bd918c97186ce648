use serde_json::Value;

use crate::error::Error;

/// Validates a Thing Description document against a schema before it is turned into a
/// [`crate::td::Thing`].
///
/// This crate treats TD JSON-schema validation as a host concern, the same way the Scripting
/// API spec leaves schema enforcement to the implementation: bring a real schema validator by
/// implementing this trait and passing it to [`crate::wot::Wot::with_validator`].
/// [`PermissiveValidator`] is the default and accepts every document, so out of the box this
/// crate behaves exactly as if no validation seam existed.
pub trait Validator: Send + Sync {
    /// Validate `document`, the already-parsed TD JSON. Return `Err` to reject it before
    /// construction; the error surfaces to the caller of `produce`/`consume` unchanged.
    fn validate(&self, document: &Value) -> Result<(), Error>;
}

/// The default [`Validator`]: accepts every document.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveValidator;

impl Validator for PermissiveValidator {
    fn validate(&self, _document: &Value) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RejectEverything;

    impl Validator for RejectEverything {
        fn validate(&self, _document: &Value) -> Result<(), Error> {
            Err(Error::InvalidThingDescription("rejected by test validator".into()))
        }
    }

    #[test]
    fn permissive_validator_accepts_anything() {
        let validator = PermissiveValidator;
        assert!(validator.validate(&serde_json::json!({"whatever": true})).is_ok());
    }

    #[test]
    fn custom_validator_can_reject() {
        let validator = RejectEverything;
        let err = validator.validate(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, Error::InvalidThingDescription(_)));
    }
}
