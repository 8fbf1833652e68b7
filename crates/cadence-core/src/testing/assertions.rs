//! Test assertion macros.
//!
//! Provides ergonomic assertion macros for common Cadence testing patterns.

/// Assert that a result is Ok.
///
/// # Example
///
/// ```ignore
/// let result = some_operation();
/// assert_ok!(result);
/// assert_ok!(result, "Operation should succeed");
/// ```
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match &$expr {
            Ok(_) => (),
            Err(e) => panic!("assertion failed: expected Ok, got Err({:?})", e),
        }
    };
    ($expr:expr, $($arg:tt)+) => {
        match &$expr {
            Ok(_) => (),
            Err(e) => panic!("assertion failed: {}: expected Ok, got Err({:?})", format_args!($($arg)+), e),
        }
    };
}

/// Assert that a result is Err.
///
/// # Example
///
/// ```ignore
/// let result: Result<(), CadenceError> = Err(CadenceError::Validation("title".into()));
/// assert_err!(result);
/// ```
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match &$expr {
            Err(_) => (),
            Ok(v) => panic!("assertion failed: expected Err, got Ok({:?})", v),
        }
    };
    ($expr:expr, $($arg:tt)+) => {
        match &$expr {
            Err(_) => (),
            Ok(v) => panic!("assertion failed: {}: expected Err, got Ok({:?})", format_args!($($arg)+), v),
        }
    };
}

/// Assert that an error matches a specific variant.
///
/// # Example
///
/// ```ignore
/// let result: Result<(), CadenceError> = Err(CadenceError::NotFound("user".into()));
/// assert_err_variant!(result, CadenceError::NotFound(_));
/// ```
#[macro_export]
macro_rules! assert_err_variant {
    ($expr:expr, $variant:pat) => {
        match &$expr {
            Err($variant) => (),
            Err(e) => panic!(
                "assertion failed: expected {}, got {:?}",
                stringify!($variant),
                e
            ),
            Ok(v) => panic!(
                "assertion failed: expected Err({}), got Ok({:?})",
                stringify!($variant),
                v
            ),
        }
    };
}

/// Assert that the mock transport delivered to a recipient.
///
/// # Example
///
/// ```ignore
/// assert_notified!(transport, "ada@example.com");
/// assert_notified!(transport, "ada@example.com", |data| data["template"] == "welcome");
/// ```
#[macro_export]
macro_rules! assert_notified {
    ($transport:expr, $recipient:expr) => {
        $transport.assert_sent_to($recipient);
    };
    ($transport:expr, $recipient:expr, $predicate:expr) => {
        $transport.assert_sent_with($recipient, $predicate);
    };
}

/// Assert that the mock task store created a task with the given title.
///
/// # Example
///
/// ```ignore
/// assert_task_created!(tasks, "Schedule phone screen");
/// ```
#[macro_export]
macro_rules! assert_task_created {
    ($tasks:expr, $title:expr) => {
        $tasks.assert_created($title);
    };
}

#[cfg(test)]
mod tests {
    use crate::error::CadenceError;

    #[test]
    fn test_assert_ok_macro() {
        let result: Result<i32, String> = Ok(42);
        assert_ok!(result);
    }

    #[test]
    #[should_panic(expected = "expected Ok")]
    fn test_assert_ok_macro_fails() {
        let result: Result<i32, String> = Err("error".to_string());
        assert_ok!(result);
    }

    #[test]
    fn test_assert_err_macro() {
        let result: Result<i32, String> = Err("error".to_string());
        assert_err!(result);
    }

    #[test]
    #[should_panic(expected = "expected Err")]
    fn test_assert_err_macro_fails() {
        let result: Result<i32, String> = Ok(42);
        assert_err!(result);
    }

    #[test]
    fn test_assert_err_variant_macro() {
        let result: Result<(), CadenceError> = Err(CadenceError::NotFound("workflow".into()));
        assert_err_variant!(result, CadenceError::NotFound(_));
    }

    #[test]
    #[should_panic(expected = "expected CadenceError::Validation")]
    fn test_assert_err_variant_macro_wrong_variant() {
        let result: Result<(), CadenceError> = Err(CadenceError::Internal("boom".into()));
        assert_err_variant!(result, CadenceError::Validation(_));
    }
}
