//! The Conflict / Error Aggregator: two linear scans over the plan,
//! run before any side effect so conflicts and collaborator errors are always
//! reported in full rather than one at a time.
use crate::plan::Op;
use crate::Error;

/// Fails with [`Error::CheckoutConflict`] or [`Error::Internal`] if the plan carries
/// any `conflict` or `error` ops; otherwise returns `Ok(())`, meaning it's safe to apply.
pub fn check(plan: &[Op]) -> Result<(), Error> {
    let conflicts: Vec<_> = plan
        .iter()
        .filter_map(|op| match op {
            Op::Conflict(path) => Some(path.clone()),
            _ => None,
        })
        .collect();
    if !conflicts.is_empty() {
        return Err(Error::CheckoutConflict(conflicts));
    }

    let errors: Vec<_> = plan
        .iter()
        .filter_map(|op| match op {
            Op::Error(message) => Some(message.clone()),
            _ => None,
        })
        .collect();
    if !errors.is_empty() {
        return Err(Error::Internal(errors));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::BString;

    #[test]
    fn conflicts_are_reported_before_errors_and_block_apply() {
        let plan = vec![
            Op::Conflict(BString::from("a")),
            Op::Conflict(BString::from("b")),
            Op::Error("bad".into()),
        ];
        match check(&plan) {
            Err(Error::CheckoutConflict(paths)) => assert_eq!(paths.len(), 2),
            other => panic!("expected CheckoutConflict, got {other:?}"),
        }
    }

    #[test]
    fn clean_plan_passes() {
        let plan = vec![Op::Mkdir(BString::from("d"))];
        assert!(check(&plan).is_ok());
    }
}
