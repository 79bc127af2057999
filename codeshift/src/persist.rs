//! JSON persistence for pairing trees.
//!
//! A stored [`ListOfChanges`] is untrusted input: decoding always checks it
//! for consistency before handing it back, so the planner and the replay can
//! rely on every address resolving.

use crate::block::CodeBlock;
use crate::tracing_macros::debug;
use crate::pairing::{ListOfChanges, PairingError};
use facet::Facet;
use facet_error as error;

/// Errors raised while storing or loading a pairing tree.
#[derive(Facet, Debug)]
#[facet(derive(Error))]
#[repr(u8)]
pub enum PersistError {
    /// could not encode pairing as JSON: {message}
    Encode { message: String },

    /// could not decode pairing from JSON: {message}
    Decode { message: String },

    /// decoded pairing is inconsistent: {cause}
    Invalid {
        #[facet(error::source)]
        cause: PairingError,
    },
}

/// Encode a pairing tree as compact JSON.
pub fn to_json(changes: &ListOfChanges) -> Result<String, PersistError> {
    facet_json::to_string(changes).map_err(|e| PersistError::Encode {
        message: e.to_string(),
    })
}

/// Encode a pairing tree as indented JSON.
pub fn to_json_pretty(changes: &ListOfChanges) -> Result<String, PersistError> {
    facet_json::to_string_pretty(changes).map_err(|e| PersistError::Encode {
        message: e.to_string(),
    })
}

fn decode(json: &str) -> Result<ListOfChanges, PersistError> {
    facet_json::from_str::<ListOfChanges>(json).map_err(|e| PersistError::Decode {
        message: e.to_string(),
    })
}

/// Decode a pairing tree and check that it is internally consistent.
pub fn from_json(json: &str) -> Result<ListOfChanges, PersistError> {
    let changes = decode(json)?;
    changes
        .validate()
        .map_err(|cause| PersistError::Invalid { cause })?;
    debug!(
        before = changes.input_destinations.len(),
        after = changes.output_sources.len(),
        "pairing decoded"
    );
    Ok(changes)
}

/// Decode a pairing tree and check it against the block lists it claims to
/// describe.
pub fn from_json_for(
    json: &str,
    before: &[CodeBlock],
    after: &[CodeBlock],
) -> Result<ListOfChanges, PersistError> {
    let changes = decode(json)?;
    changes
        .validate_against(before, after)
        .map_err(|cause| PersistError::Invalid { cause })?;
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::match_blocks;
    use crate::pairing::CodeChange;
    use crate::plan::{plan_changes, plan_with_blocks};
    use facet_testhelpers::test;

    fn program(total: &str) -> Vec<CodeBlock> {
        vec![
            CodeBlock::definition(
                "function",
                Some("sum"),
                &["xs"],
                vec![
                    CodeBlock::text("fn sum(xs) {\n"),
                    CodeBlock::action(total, &["t"], &["xs"]),
                    CodeBlock::action("  return t;\n", &[], &["t"]),
                    CodeBlock::text("}\n"),
                ],
            ),
            CodeBlock::text("\n"),
            CodeBlock::action("print(sum(v));\n", &[], &["sum", "v"]),
        ]
    }

    #[test]
    fn test_decoded_pairing_plans_the_same() {
        let before = program("  let t = 0;\n");
        let after = program("  let t = xs.sum();\n");
        let changes = match_blocks(&before, &after);

        let json = to_json(&changes).unwrap();
        let decoded = from_json_for(&json, &before, &after).unwrap();
        assert_eq!(decoded, changes);
        assert_eq!(plan_changes(&decoded), plan_changes(&changes));
        assert_eq!(
            plan_with_blocks(&before, &after, &decoded),
            plan_with_blocks(&before, &after, &changes)
        );

        let pretty = to_json_pretty(&changes).unwrap();
        assert!(pretty.contains('\n'));
        assert_eq!(from_json(&pretty).unwrap(), changes);
    }

    #[test]
    fn test_inconsistent_pairing_is_rejected() {
        let broken = ListOfChanges::new(vec![CodeChange::paired(0)], vec![CodeChange::added()], 0);
        let json = to_json(&broken).unwrap();
        let err = from_json(&json).unwrap_err();
        assert!(
            matches!(
                err,
                PersistError::Invalid {
                    cause: PairingError::AsymmetricPairing { before: 0, after: 0, .. }
                }
            ),
            "got {err:?}"
        );
        assert!(err.to_string().starts_with("decoded pairing is inconsistent"));
    }

    #[test]
    fn test_pairing_for_other_blocks_is_rejected() {
        let before = program("  let t = 0;\n");
        let changes = match_blocks(&before, &before);
        let json = to_json(&changes).unwrap();

        let shorter = &before[..2];
        let err = from_json_for(&json, shorter, shorter).unwrap_err();
        assert!(
            matches!(
                err,
                PersistError::Invalid {
                    cause: PairingError::LengthMismatch { changes: 3, blocks: 2, .. }
                }
            ),
            "got {err:?}"
        );
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        let err = from_json("{\"input_destinations\": 3").unwrap_err();
        assert!(matches!(err, PersistError::Decode { .. }), "got {err:?}");
    }
}
