//! Typed wizard state and its JSON boundary.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{Result, WizardError};
use wizard_core::{StateBag, StoredContext, WorkflowContext};

/// Data carried by a wizard between steps.
///
/// Any serde type with a default qualifies; [`StateBag`] covers wizards
/// without a concrete shape. State must serialize to a JSON object so
/// patches can be merged into it.
pub trait WizardState: Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static {}

impl<T> WizardState for T where T: Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static {}

/// Shallow-merge `patch` into `state`: each patch key replaces the prior value wholesale.
pub fn merge_patch<S: WizardState>(state: &S, patch: &StateBag) -> Result<S> {
    let mut value = serde_json::to_value(state)?;
    let Value::Object(fields) = &mut value else {
        return Err(WizardError::InvalidPatch(
            "state does not serialize to an object".to_string(),
        ));
    };

    for (key, patched) in patch {
        fields.insert(key.clone(), patched.clone());
    }

    serde_json::from_value(value).map_err(|e| WizardError::InvalidPatch(e.to_string()))
}

/// Convert a typed context to its storage form
pub fn to_stored<S: WizardState>(context: &WorkflowContext<S>) -> Result<StoredContext> {
    let state = serde_json::to_value(&context.state)?;
    Ok(context.clone().map_state(|_| state))
}

/// Decode a stored context into its typed form
pub fn from_stored<S: WizardState>(stored: StoredContext) -> Result<WorkflowContext<S>> {
    let state: S = match &stored.state {
        Value::Null => S::default(),
        other => serde_json::from_value(other.clone())?,
    };
    Ok(stored.map_state(|_| state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    struct Profile {
        email: Option<String>,
        address: Option<Address>,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Address {
        city: String,
        zip: Option<String>,
    }

    fn bag(value: Value) -> StateBag {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_patch_replaces_nested_values() {
        let state = bag(json!({"address": {"city": "Oslo", "zip": "0150"}, "email": "a@b.com"}));
        let merged = merge_patch(&state, &bag(json!({"address": {"city": "Bergen"}}))).unwrap();

        assert_eq!(merged["address"], json!({"city": "Bergen"}));
        assert_eq!(merged["email"], "a@b.com");
    }

    #[test]
    fn test_patch_is_idempotent() {
        let state = Profile::default();
        let patch = bag(json!({"email": "a@b.com"}));

        let once = merge_patch(&state, &patch).unwrap();
        let twice = merge_patch(&once, &patch).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_typed_patch_rejects_wrong_shape() {
        let err = merge_patch(&Profile::default(), &bag(json!({"address": 12}))).unwrap_err();
        assert!(matches!(err, WizardError::InvalidPatch(_)));
    }

    #[test]
    fn test_non_object_state_rejected() {
        let err = merge_patch(&7u32, &bag(json!({"a": 1}))).unwrap_err();
        assert!(matches!(err, WizardError::InvalidPatch(_)));
    }

    #[test]
    fn test_stored_round_trip_keeps_metadata() {
        let mut ctx = WorkflowContext::new("w", 2, "b", None, Some("u".into()), Profile::default());
        ctx.revision = 4;

        let stored = to_stored(&ctx).unwrap();
        assert_eq!(stored.state, json!({"email": null, "address": null}));

        let back: WorkflowContext<Profile> = from_stored(stored).unwrap();
        assert_eq!(back, ctx);
    }

    #[test]
    fn test_null_state_decodes_to_default() {
        let stored = WorkflowContext::new("w", 1, "a", None, None, Value::Null);
        let ctx: WorkflowContext<StateBag> = from_stored(stored).unwrap();
        assert!(ctx.state.is_empty());
    }
}
