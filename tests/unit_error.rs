use std::path::PathBuf;

use crit::error::{exit_codes, Error, JsonError};

#[test]
fn exit_codes_group_by_cause() {
    assert_eq!(
        Error::InvalidArgument("x".to_string()).exit_code(),
        exit_codes::USER_ERROR
    );
    assert_eq!(
        Error::TaskNotFound("crit-abcd".to_string()).exit_code(),
        exit_codes::USER_ERROR
    );
    assert_eq!(
        Error::NotInitialized(PathBuf::from("/tmp")).exit_code(),
        exit_codes::USER_ERROR
    );
    assert_eq!(
        Error::TransitionRejected {
            task_id: "crit-abcd".to_string(),
            errors: vec!["nope".to_string()],
        }
        .exit_code(),
        exit_codes::TRANSITION_REJECTED
    );
    assert_eq!(
        Error::LockFailed(PathBuf::from(".crit/.lock")).exit_code(),
        exit_codes::OPERATION_FAILED
    );
}

#[test]
fn validation_errors_join_in_message_and_list_in_details() {
    let err = Error::Validation(vec![
        "title: cannot be empty".to_string(),
        "storyPoints: must be a positive integer".to_string(),
    ]);
    assert_eq!(
        err.to_string(),
        "Validation failed: title: cannot be empty; storyPoints: must be a positive integer"
    );

    let json = JsonError::from(&err);
    assert_eq!(json.code, exit_codes::USER_ERROR);
    let details = json.details.expect("details");
    assert_eq!(details["errors"].as_array().map(Vec::len), Some(2));
}

#[test]
fn plain_errors_have_no_details() {
    let json = JsonError::from(&Error::OperationFailed("disk full".to_string()));
    assert_eq!(json.error, "Operation failed: disk full");
    assert!(json.details.is_none());
}
